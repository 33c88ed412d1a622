//! Reduction of apportioned hours into report rows.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Timelike, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::apportion::Apportionment;
use crate::bucket::ReportWindow;
use crate::event::Event;
use crate::source::Source;
use crate::types::SourceId;

/// Which source attribute report rows are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Source,
    Category,
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Source => "source",
            Self::Category => "category",
        };
        write!(f, "{s}")
    }
}

impl FromStr for GroupBy {
    type Err = UnknownGroupBy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source" | "calendar" => Ok(Self::Source),
            "category" => Ok(Self::Category),
            _ => Err(UnknownGroupBy(s.to_string())),
        }
    }
}

/// Error type for unknown grouping strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown grouping: {0} (expected source or category)")]
pub struct UnknownGroupBy(String);

/// One `(bucket, group)` cell of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub bucket_label: String,
    pub group_label: String,
    pub duration_hours: f64,
    /// Share of the bucket total, 0-100.
    pub percent: f64,
}

/// Per-group totals over the whole reporting window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub group_label: String,
    pub total_hours: f64,
    /// Mean apportioned hours per event.
    pub mean_hours: f64,
    pub event_count: usize,
    pub percent: f64,
}

/// Hours that started in one weekday and hour-of-day slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityCell {
    /// Three-letter weekday (`Mon` .. `Sun`).
    pub weekday: String,
    /// Local hour of day, 0-23.
    pub hour: u32,
    pub hours: f64,
}

/// Resolves an event's group label from the configured sources.
pub(crate) struct GroupResolver<'a> {
    by_id: HashMap<&'a SourceId, &'a Source>,
    group_by: GroupBy,
}

impl<'a> GroupResolver<'a> {
    pub(crate) fn new(sources: &'a [Source], group_by: GroupBy) -> Self {
        Self {
            by_id: sources.iter().map(|s| (&s.id, s)).collect(),
            group_by,
        }
    }

    /// Events from an unconfigured source are grouped under their source id.
    pub(crate) fn label(&self, event: &Event) -> String {
        match self.by_id.get(&event.source_id) {
            Some(source) => match self.group_by {
                GroupBy::Source => source.display_name.clone(),
                GroupBy::Category => source.category.clone(),
            },
            None => event.source_id.to_string(),
        }
    }
}

/// Sums apportioned hours per `(bucket, group)`.
///
/// Every bucket gets a row for every group that has hours anywhere in the
/// window, zero-filled where needed. Rows are sorted by bucket label, then
/// group label.
pub fn aggregate(
    apportionment: &Apportionment,
    events: &[Event],
    sources: &[Source],
    group_by: GroupBy,
) -> Vec<ReportRow> {
    let resolver = GroupResolver::new(sources, group_by);

    let mut groups = BTreeSet::new();
    let mut cells: HashMap<(usize, String), f64> = HashMap::new();
    for record in &apportionment.records {
        let group = resolver.label(&events[record.event_index]);
        groups.insert(group.clone());
        *cells.entry((record.bucket_index, group)).or_default() += record.overlap_hours;
    }

    let mut rows = Vec::with_capacity(apportionment.buckets.len() * groups.len());
    for (bucket_index, bucket) in apportionment.buckets.iter().enumerate() {
        let hours: Vec<f64> = groups
            .iter()
            .map(|group| {
                cells
                    .get(&(bucket_index, group.clone()))
                    .copied()
                    .unwrap_or_default()
            })
            .collect();
        let total: f64 = hours.iter().sum();

        rows.extend(groups.iter().zip(hours).map(|(group, duration_hours)| ReportRow {
            bucket_label: bucket.label.clone(),
            group_label: group.clone(),
            duration_hours,
            percent: percent_of(duration_hours, total),
        }));
    }

    rows.sort_by(|a, b| {
        a.bucket_label
            .cmp(&b.bucket_label)
            .then_with(|| a.group_label.cmp(&b.group_label))
    });
    rows
}

/// Totals per group across all buckets, sorted by group label.
#[allow(clippy::cast_precision_loss)]
pub fn summarize(
    apportionment: &Apportionment,
    events: &[Event],
    sources: &[Source],
    group_by: GroupBy,
) -> Vec<SummaryRow> {
    let resolver = GroupResolver::new(sources, group_by);

    let mut totals: BTreeMap<String, (f64, BTreeSet<usize>)> = BTreeMap::new();
    for record in &apportionment.records {
        let group = resolver.label(&events[record.event_index]);
        let (hours, members) = totals.entry(group).or_default();
        *hours += record.overlap_hours;
        members.insert(record.event_index);
    }

    let grand_total: f64 = totals.values().map(|(hours, _)| hours).sum();

    totals
        .into_iter()
        .map(|(group_label, (total_hours, members))| {
            let event_count = members.len();
            SummaryRow {
                group_label,
                total_hours,
                mean_hours: if event_count == 0 {
                    0.0
                } else {
                    total_hours / event_count as f64
                },
                event_count,
                percent: percent_of(total_hours, grand_total),
            }
        })
        .collect()
}

/// Weekly activity pattern: full event hours by local start weekday and hour.
///
/// Only events starting inside `window` count, and each contributes its
/// whole duration to the slot it starts in. Empty slots are omitted; cells
/// run Monday first, then by hour.
pub fn activity(events: &[Event], window: &ReportWindow, tz: Tz) -> Vec<ActivityCell> {
    let mut slots: BTreeMap<(u32, u32), (Weekday, f64)> = BTreeMap::new();
    for event in events
        .iter()
        .filter(|e| window.start() <= e.start && e.start < window.end())
    {
        let local = event.start.with_timezone(&tz);
        let weekday = local.weekday();
        let slot = slots
            .entry((weekday.num_days_from_monday(), local.hour()))
            .or_insert((weekday, 0.0));
        slot.1 += event.duration_hours();
    }

    slots
        .into_iter()
        .filter(|(_, (_, hours))| *hours > 0.0)
        .map(|((_, hour), (weekday, hours))| ActivityCell {
            weekday: weekday.to_string(),
            hour,
            hours,
        })
        .collect()
}

fn percent_of(part: f64, total: f64) -> f64 {
    if total > 0.0 { part / total * 100.0 } else { 0.0 }
}
