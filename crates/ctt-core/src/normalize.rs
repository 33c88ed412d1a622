//! Event normalization.
//!
//! Feed parsers hand over [`RawEvent`]s whose times are still expressed the
//! way the feed wrote them (UTC, floating, zoned or all-day). Normalization
//! resolves those into instants and produces canonical [`Event`]s.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

use crate::event::Event;
use crate::types::{SourceId, Uid, ValidationError};

/// Title used for events without a SUMMARY.
pub const UNTITLED: &str = "Untitled Event";

/// Errors for a single event that could not be normalized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The TZID is not a known IANA timezone.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    /// The local time falls into a DST gap.
    #[error("local time {datetime} does not exist in {tz}")]
    NonexistentLocalTime { datetime: NaiveDateTime, tz: String },
    /// The event failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// A time value as written in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTime {
    /// All-day value (`VALUE=DATE`).
    Date(NaiveDate),
    /// UTC value (`...Z`).
    Utc(DateTime<Utc>),
    /// Local time with no zone attached.
    Floating(NaiveDateTime),
    /// Local time in a named zone (`TZID=...`).
    Zoned { datetime: NaiveDateTime, tzid: String },
}

/// An event as produced by a feed parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub uid: Option<String>,
    pub title: Option<String>,
    pub start: RawTime,
    pub end: Option<RawTime>,
    /// `DURATION`, used only when `end` is absent.
    pub duration: Option<Duration>,
    /// `RECURRENCE-ID` of an overridden instance.
    pub recurrence_id: Option<RawTime>,
}

impl RawTime {
    /// Resolves the value to an instant.
    ///
    /// Floating and all-day values are interpreted in `default_tz`.
    pub fn resolve(&self, default_tz: Tz) -> Result<DateTime<Utc>, NormalizeError> {
        match self {
            Self::Utc(dt) => Ok(*dt),
            Self::Floating(naive) => resolve_local(default_tz, *naive),
            Self::Date(date) => Ok(local_midnight(default_tz, *date)),
            Self::Zoned { datetime, tzid } => {
                let tz = parse_tzid(tzid)?;
                resolve_local(tz, *datetime)
            }
        }
    }
}

/// Converts a raw event into a canonical event for `source_id`.
///
/// A missing end falls back to `DURATION`, then to one day for all-day
/// events, then to a zero-length event. An overridden recurrence instance
/// gets the UID `<uid>/<recurrence instant>` so it never replaces the
/// master event.
pub fn normalize(
    raw: &RawEvent,
    source_id: &SourceId,
    default_tz: Tz,
) -> Result<Event, NormalizeError> {
    let start = raw.start.resolve(default_tz)?;
    let end = match (&raw.end, raw.duration) {
        (Some(end), _) => end.resolve(default_tz)?,
        (None, Some(duration)) => start + duration,
        (None, None) => match raw.start {
            RawTime::Date(date) => local_midnight(default_tz, date + Duration::days(1)),
            _ => start,
        },
    };

    let uid = match raw.uid.as_deref().map(str::trim).filter(|uid| !uid.is_empty()) {
        Some(uid) => match &raw.recurrence_id {
            Some(recurrence_id) => {
                let instance = recurrence_id.resolve(default_tz)?;
                Uid::new(format!(
                    "{uid}/{}",
                    instance.to_rfc3339_opts(SecondsFormat::Secs, true)
                ))
                .ok()
            }
            None => Uid::new(uid).ok(),
        },
        None => None,
    };
    let title = raw
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED);

    Ok(Event::new(uid, source_id.clone(), title, start, end)?)
}

/// Parses a TZID parameter value into an IANA timezone.
pub fn parse_tzid(tzid: &str) -> Result<Tz, NormalizeError> {
    let cleaned = tzid.trim().trim_matches('"');
    cleaned
        .parse::<Tz>()
        .map_err(|_| NormalizeError::UnknownTimezone(tzid.to_string()))
}

/// Resolves a local time to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Result<DateTime<Utc>, NormalizeError> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
        LocalResult::None => Err(NormalizeError::NonexistentLocalTime {
            datetime: naive,
            tz: tz.name().to_string(),
        }),
    }
}

/// Returns the first instant of `date` in `tz`.
///
/// When midnight is skipped by a DST transition, the first existing
/// quarter hour after it is used.
pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    (0..=16)
        .map(|quarter| midnight + Duration::minutes(15 * quarter))
        .find_map(|candidate| resolve_local(tz, candidate).ok())
        .unwrap_or_else(|| midnight.and_utc())
}
