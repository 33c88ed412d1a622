//! Merging freshly fetched events into a cached event set.
//!
//! # Algorithm Summary
//!
//! 1. An empty fetch leaves the cached set untouched.
//! 2. Under [`ReconcilePolicy::Windowed`], identified cached events that
//!    start inside the recency window are dropped when the fetch carries
//!    identified events; the fetch is authoritative for that span.
//! 3. Cached and fresh events are concatenated (fresh last) and collapsed by
//!    [`EventIdentity`], keeping the last copy. A re-reported UID therefore
//!    replaces its cached copy, and anonymous events sharing `(start, end)`
//!    collapse to the fresh one.
//! 4. The result is sorted chronologically.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::event::{Event, EventIdentity};

/// Default recency window in days for [`ReconcilePolicy::Windowed`].
pub const DEFAULT_RECENCY_DAYS: u32 = 30;

/// Policy for dropping cached events that a fetch no longer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// Only events whose UID is re-reported are replaced; everything else
    /// stays cached.
    Unbounded,
    /// Identified events starting within the last `days` days mirror the
    /// fetch; older events are kept verbatim even when absent from it.
    Windowed { days: u32 },
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self::Windowed {
            days: DEFAULT_RECENCY_DAYS,
        }
    }
}

impl ReconcilePolicy {
    /// Maps a configured recency length to a policy; `0` means unbounded.
    pub const fn from_recency_days(days: u32) -> Self {
        if days == 0 {
            Self::Unbounded
        } else {
            Self::Windowed { days }
        }
    }

    /// Start of the recency window, if any.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Unbounded => None,
            Self::Windowed { days } => Some(now - Duration::days(i64::from(*days))),
        }
    }
}

/// Merges `fresh` into `existing` under `policy`.
///
/// `now` anchors the recency window. An empty `fresh` returns `existing`
/// unchanged.
pub fn merge_events(
    existing: Vec<Event>,
    fresh: Vec<Event>,
    policy: ReconcilePolicy,
    now: DateTime<Utc>,
) -> Vec<Event> {
    if fresh.is_empty() {
        return existing;
    }

    let fetch_is_identified = fresh.iter().any(|event| event.uid.is_some());
    let cutoff = policy.cutoff(now).filter(|_| fetch_is_identified);

    let cached = existing.len();
    let retained: Vec<Event> = existing
        .into_iter()
        .filter(|event| {
            let in_window = cutoff.is_some_and(|cutoff| event.start >= cutoff);
            !(event.uid.is_some() && in_window)
        })
        .collect();
    if retained.len() < cached {
        tracing::debug!(
            dropped = cached - retained.len(),
            "dropped cached events inside the recency window"
        );
    }

    let mut merged = dedup_last_wins(retained.into_iter().chain(fresh));
    merged.sort_by(Event::chronological_cmp);
    merged
}

/// Collapses events sharing an identity, keeping the last occurrence.
fn dedup_last_wins(events: impl DoubleEndedIterator<Item = Event>) -> Vec<Event> {
    let mut seen: HashSet<EventIdentity> = HashSet::new();
    let mut kept: Vec<Event> = events
        .rev()
        .filter(|event| seen.insert(event.identity()))
        .collect();
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SourceId, Uid};
    use chrono::TimeZone;

    fn source() -> SourceId {
        SourceId::from_address("https://example.com/cal.ics")
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn identified(uid: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event::new(Some(Uid::new(uid).unwrap()), source(), uid, start, end).unwrap()
    }

    fn anonymous(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event::new(None, source(), title, start, end).unwrap()
    }

    fn uids(events: &[Event]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| e.uid.as_ref().map(Uid::as_str))
            .collect()
    }

    #[test]
    fn empty_fetch_returns_cache_unchanged() {
        let cached = vec![
            identified("B", at(2024, 1, 2, 10), at(2024, 1, 2, 11)),
            identified("A", at(2024, 1, 1, 10), at(2024, 1, 1, 11)),
        ];
        let merged = merge_events(
            cached.clone(),
            Vec::new(),
            ReconcilePolicy::default(),
            at(2024, 1, 3, 0),
        );
        assert_eq!(merged, cached);
    }

    #[test]
    fn reused_uid_replaces_old_copy() {
        let cached = vec![identified("X", at(2023, 6, 1, 8), at(2023, 6, 1, 9))];
        let fresh = vec![identified("X", at(2024, 2, 1, 14), at(2024, 2, 1, 16))];

        for policy in [ReconcilePolicy::Unbounded, ReconcilePolicy::default()] {
            let merged = merge_events(cached.clone(), fresh.clone(), policy, at(2024, 2, 2, 0));
            assert_eq!(merged, fresh, "policy {policy:?}");
        }
    }

    #[test]
    fn unbounded_keeps_unreported_events() {
        let cached = vec![identified("A", at(2024, 1, 1, 10), at(2024, 1, 1, 11))];
        let fresh = vec![identified("B", at(2024, 1, 2, 10), at(2024, 1, 2, 11))];
        let merged = merge_events(cached, fresh, ReconcilePolicy::Unbounded, at(2024, 1, 3, 0));
        assert_eq!(uids(&merged), vec!["A", "B"]);
    }

    #[test]
    fn windowed_drops_unreported_recent_events() {
        let cached = vec![identified("A", at(2024, 1, 1, 10), at(2024, 1, 1, 11))];
        let fresh = vec![identified("B", at(2024, 1, 20, 10), at(2024, 1, 20, 11))];
        let merged = merge_events(
            cached,
            fresh,
            ReconcilePolicy::Windowed { days: 30 },
            at(2024, 1, 25, 0),
        );
        assert_eq!(uids(&merged), vec!["B"]);
    }

    #[test]
    fn windowed_keeps_unreported_old_events() {
        let cached = vec![identified("A", at(2024, 1, 1, 10), at(2024, 1, 1, 11))];
        let fresh = vec![identified("B", at(2024, 3, 20, 10), at(2024, 3, 20, 11))];
        let merged = merge_events(
            cached,
            fresh,
            ReconcilePolicy::Windowed { days: 30 },
            at(2024, 3, 25, 0),
        );
        assert_eq!(uids(&merged), vec!["A", "B"]);
    }

    #[test]
    fn windowed_replace_applies_to_old_uids_too() {
        let cached = vec![identified("A", at(2023, 1, 1, 10), at(2023, 1, 1, 11))];
        let fresh = vec![identified("A", at(2023, 1, 1, 12), at(2023, 1, 1, 13))];
        let merged = merge_events(
            cached,
            fresh.clone(),
            ReconcilePolicy::Windowed { days: 30 },
            at(2024, 3, 25, 0),
        );
        assert_eq!(merged, fresh);
    }

    #[test]
    fn identified_merge_is_idempotent() {
        let cached = vec![
            identified("A", at(2023, 12, 1, 10), at(2023, 12, 1, 11)),
            identified("B", at(2024, 1, 10, 10), at(2024, 1, 10, 11)),
        ];
        let fresh = vec![
            identified("B", at(2024, 1, 10, 12), at(2024, 1, 10, 13)),
            identified("C", at(2024, 1, 12, 9), at(2024, 1, 12, 10)),
        ];
        let now = at(2024, 1, 15, 0);

        for policy in [ReconcilePolicy::Unbounded, ReconcilePolicy::default()] {
            let once = merge_events(cached.clone(), fresh.clone(), policy, now);
            let twice = merge_events(once.clone(), fresh.clone(), policy, now);
            assert_eq!(once, twice, "policy {policy:?}");
        }
    }

    #[test]
    fn anonymous_duplicates_collapse_to_one() {
        let start = at(2024, 1, 1, 10);
        let end = at(2024, 1, 1, 11);
        let cached = vec![anonymous("Old title", start, end)];
        let fresh = vec![anonymous("New title", start, end)];
        let merged = merge_events(cached, fresh, ReconcilePolicy::default(), at(2024, 1, 2, 0));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "New title");
    }

    #[test]
    fn anonymous_events_are_never_windowed_out() {
        let cached = vec![anonymous("Gym", at(2024, 1, 20, 7), at(2024, 1, 20, 8))];
        let fresh = vec![anonymous("Gym", at(2024, 1, 22, 7), at(2024, 1, 22, 8))];
        let merged = merge_events(
            cached,
            fresh,
            ReconcilePolicy::Windowed { days: 30 },
            at(2024, 1, 25, 0),
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn repeated_uid_within_fetch_keeps_last() {
        let fresh = vec![
            identified("A", at(2024, 1, 1, 10), at(2024, 1, 1, 11)),
            identified("A", at(2024, 1, 1, 14), at(2024, 1, 1, 15)),
        ];
        let merged = merge_events(Vec::new(), fresh, ReconcilePolicy::default(), at(2024, 1, 2, 0));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start, at(2024, 1, 1, 14));
    }

    #[test]
    fn output_is_sorted_chronologically() {
        let fresh = vec![
            identified("late", at(2024, 1, 3, 10), at(2024, 1, 3, 11)),
            identified("early", at(2024, 1, 1, 10), at(2024, 1, 1, 11)),
        ];
        let merged = merge_events(Vec::new(), fresh, ReconcilePolicy::Unbounded, at(2024, 1, 4, 0));
        assert_eq!(uids(&merged), vec!["early", "late"]);
    }

    #[test]
    fn policy_from_recency_days() {
        assert_eq!(
            ReconcilePolicy::from_recency_days(0),
            ReconcilePolicy::Unbounded
        );
        assert_eq!(
            ReconcilePolicy::from_recency_days(7),
            ReconcilePolicy::Windowed { days: 7 }
        );
    }
}
