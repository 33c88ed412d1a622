//! Normalized calendar events.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{SourceId, Uid, ValidationError};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// One calendar entry after normalization.
///
/// `start` and `end` are instants; `end >= start` always holds for a
/// constructed event. Zero-length events are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier assigned by the source, if the feed provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
    /// The cache partition this event belongs to.
    pub source_id: SourceId,
    /// Event summary.
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// How an event is recognized across fetch cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventIdentity {
    /// The source supplied a stable UID.
    Identified { uid: Uid },
    /// No UID; the time span is the only identity available.
    Anonymous {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Event {
    /// Creates an event, rejecting spans that end before they start.
    pub fn new(
        uid: Option<Uid>,
        source_id: SourceId,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::EndBeforeStart {
                start: start.to_rfc3339_opts(SecondsFormat::Secs, true),
                end: end.to_rfc3339_opts(SecondsFormat::Secs, true),
            });
        }
        Ok(Self {
            uid,
            source_id,
            title: title.into(),
            start,
            end,
        })
    }

    /// Length of the event in hours (0.0 for zero-length events).
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / MS_PER_HOUR
    }

    /// Returns the identity used for deduplication.
    pub fn identity(&self) -> EventIdentity {
        match &self.uid {
            Some(uid) => EventIdentity::Identified { uid: uid.clone() },
            None => EventIdentity::Anonymous {
                start: self.start,
                end: self.end,
            },
        }
    }

    /// Whether the event has no length.
    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }

    /// Chronological ordering with identity as the tie breaker.
    pub fn chronological_cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
            .then_with(|| self.identity().cmp(&other.identity()))
    }
}

/// Converts a millisecond span into fractional hours.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / MS_PER_HOUR
}
