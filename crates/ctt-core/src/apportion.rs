//! Time apportionment.
//!
//! Splits each event's duration across every bucket it overlaps, in
//! proportion to the overlap, instead of crediting the whole event to the
//! bucket it starts in.
//!
//! # Algorithm Summary
//!
//! 1. Tile the reporting window with buckets of the requested granularity.
//! 2. For each event touching the window, locate the first bucket that can
//!    overlap it (binary search on bucket ends) and walk forward while the
//!    buckets still start before the event ends.
//! 3. Emit `overlap_hours = min(ends) - max(starts)` for every positive
//!    overlap. Zero-length events emit one zero-hour record in the bucket
//!    containing their instant.
//!
//! For an event inside the window the emitted hours sum to its duration;
//! the parts outside the window are clipped away.

use chrono_tz::Tz;

use crate::bucket::{Bucket, Granularity, ReportWindow, buckets};
use crate::event::{Event, hours_between};

/// The share of one event falling inside one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApportionmentRecord {
    /// Index into the event slice passed to [`apportion`].
    pub event_index: usize,
    /// Index into [`Apportionment::buckets`].
    pub bucket_index: usize,
    pub overlap_hours: f64,
}

/// Buckets for a window together with the per-event records.
#[derive(Debug, Clone, PartialEq)]
pub struct Apportionment {
    pub granularity: Granularity,
    pub buckets: Vec<Bucket>,
    /// Ordered by event, then bucket.
    pub records: Vec<ApportionmentRecord>,
}

impl Apportionment {
    /// The bucket a record refers to.
    pub fn bucket(&self, record: &ApportionmentRecord) -> &Bucket {
        &self.buckets[record.bucket_index]
    }

    /// Sum of apportioned hours for one event.
    pub fn hours_for_event(&self, event_index: usize) -> f64 {
        self.records
            .iter()
            .filter(|r| r.event_index == event_index)
            .map(|r| r.overlap_hours)
            .sum()
    }
}

/// Apportions `events` over `window` at `granularity`.
///
/// `tz` determines where day, week and month boundaries fall.
pub fn apportion(
    events: &[Event],
    window: &ReportWindow,
    granularity: Granularity,
    tz: Tz,
) -> Apportionment {
    let buckets = buckets(window, granularity, tz);
    let mut records = Vec::new();

    for (event_index, event) in events.iter().enumerate() {
        if !window.intersects(event.start, event.end) {
            continue;
        }

        // Buckets are sorted and disjoint, so ends are monotonic.
        let first = buckets.partition_point(|bucket| bucket.end <= event.start);

        if event.is_instant() {
            if let Some(bucket) = buckets.get(first)
                && bucket.start <= event.start
            {
                records.push(ApportionmentRecord {
                    event_index,
                    bucket_index: first,
                    overlap_hours: 0.0,
                });
            }
            continue;
        }

        for (bucket_index, bucket) in buckets.iter().enumerate().skip(first) {
            if bucket.start >= event.end {
                break;
            }
            let overlap_start = event.start.max(bucket.start);
            let overlap_end = event.end.min(bucket.end);
            if overlap_end > overlap_start {
                records.push(ApportionmentRecord {
                    event_index,
                    bucket_index,
                    overlap_hours: hours_between(overlap_start, overlap_end),
                });
            }
        }
    }

    Apportionment {
        granularity,
        buckets,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceId;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event::new(
            None,
            SourceId::from_address("https://example.com/cal.ics"),
            "Work",
            start,
            end,
        )
        .unwrap()
    }

    #[test]
    fn fifty_hour_event_spreads_over_three_days() {
        let events = vec![event(at(2024, 1, 1, 0), at(2024, 1, 3, 2))];
        let window = ReportWindow::from_dates(date(2024, 1, 1), date(2024, 1, 3), Tz::UTC).unwrap();
        let result = apportion(&events, &window, Granularity::Day, Tz::UTC);

        assert_eq!(result.records.len(), 3);
        assert!(result.records.iter().all(|r| r.overlap_hours <= 24.0));
        assert!((result.hours_for_event(0) - 50.0).abs() < 1e-6);
        let hours: Vec<f64> = result.records.iter().map(|r| r.overlap_hours).collect();
        assert_eq!(hours, vec![24.0, 24.0, 2.0]);
    }

    #[test]
    fn contained_event_sums_to_duration_at_every_granularity() {
        let events = vec![
            event(at(2024, 1, 29, 22), at(2024, 2, 5, 3)),
            event(at(2024, 3, 1, 9), at(2024, 3, 1, 17)),
        ];
        let window = ReportWindow::from_dates(date(2024, 1, 1), date(2024, 3, 31), Tz::UTC).unwrap();

        for granularity in [Granularity::Day, Granularity::Week, Granularity::Month] {
            let result = apportion(&events, &window, granularity, Tz::UTC);
            for (index, event) in events.iter().enumerate() {
                assert!(
                    (result.hours_for_event(index) - event.duration_hours()).abs() < 1e-6,
                    "{granularity}: event {index}"
                );
            }
        }
    }

    #[test]
    fn event_crossing_month_boundary_is_split() {
        let events = vec![event(at(2024, 1, 31, 20), at(2024, 2, 1, 4))];
        let window = ReportWindow::from_dates(date(2024, 1, 1), date(2024, 2, 29), Tz::UTC).unwrap();
        let result = apportion(&events, &window, Granularity::Month, Tz::UTC);

        let split: Vec<(&str, f64)> = result
            .records
            .iter()
            .map(|r| (result.bucket(r).label.as_str(), r.overlap_hours))
            .collect();
        assert_eq!(split, vec![("2024-01", 4.0), ("2024-02", 4.0)]);
    }

    #[test]
    fn straddling_event_counts_only_in_window_part() {
        // Starts 6h before the window, ends 2h into it.
        let events = vec![event(at(2023, 12, 31, 18), at(2024, 1, 1, 2))];
        let window = ReportWindow::from_dates(date(2024, 1, 1), date(2024, 1, 7), Tz::UTC).unwrap();
        let result = apportion(&events, &window, Granularity::Week, Tz::UTC);

        assert_eq!(result.records.len(), 1);
        assert!((result.hours_for_event(0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let events = vec![
            event(at(2023, 12, 1, 9), at(2023, 12, 1, 10)),
            event(at(2024, 1, 8, 0), at(2024, 1, 8, 1)),
        ];
        let window = ReportWindow::from_dates(date(2024, 1, 1), date(2024, 1, 7), Tz::UTC).unwrap();
        let result = apportion(&events, &window, Granularity::Day, Tz::UTC);
        assert!(result.records.is_empty());
    }

    #[test]
    fn zero_length_event_gets_one_zero_hour_record() {
        let instant = at(2024, 1, 2, 12);
        let events = vec![event(instant, instant)];
        let window = ReportWindow::from_dates(date(2024, 1, 1), date(2024, 1, 3), Tz::UTC).unwrap();
        let result = apportion(&events, &window, Granularity::Day, Tz::UTC);

        assert_eq!(result.records.len(), 1);
        let record = result.records[0];
        assert_eq!(result.bucket(&record).label, "2024-01-02");
        assert!(record.overlap_hours.abs() < f64::EPSILON);
    }

    #[test]
    fn zero_length_event_on_boundary_belongs_to_later_bucket() {
        let instant = at(2024, 1, 2, 0);
        let events = vec![event(instant, instant)];
        let window = ReportWindow::from_dates(date(2024, 1, 1), date(2024, 1, 3), Tz::UTC).unwrap();
        let result = apportion(&events, &window, Granularity::Day, Tz::UTC);

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.bucket(&result.records[0]).label, "2024-01-02");
    }

    #[test]
    fn buckets_respect_reporting_timezone() {
        // 23:00-01:00 in New York is 04:00-06:00 UTC on the next day.
        let tz = chrono_tz::America::New_York;
        let events = vec![event(at(2024, 1, 11, 4), at(2024, 1, 11, 6))];
        let window = ReportWindow::from_dates(date(2024, 1, 10), date(2024, 1, 11), tz).unwrap();
        let result = apportion(&events, &window, Granularity::Day, tz);

        let split: Vec<(&str, f64)> = result
            .records
            .iter()
            .map(|r| (result.bucket(r).label.as_str(), r.overlap_hours))
            .collect();
        assert_eq!(split, vec![("2024-01-10", 1.0), ("2024-01-11", 1.0)]);
    }
}
