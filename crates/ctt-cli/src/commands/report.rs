//! Report command for time per calendar.
//!
//! Implements `ctt report`: resolves the reporting window, refreshes the
//! sources (unless offline), apportions events into buckets and prints the
//! aggregated rows as a table or as JSON.

use std::collections::HashSet;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use ctt_core::{
    ActivityCell, Event, Granularity, GroupBy, ReportRow, ReportWindow, Source, SummaryRow,
    activity, aggregate, apportion, summarize,
};
use serde::Serialize;
use tracing::debug;

use crate::Config;
use crate::commands::refresh::{SourceOutcome, SourceStatus, collect_outcomes};
use crate::commands::util::resolve_window;

/// Report arguments as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ReportArgs {
    pub granularity: Granularity,
    pub group_by: GroupBy,
    pub from: Option<String>,
    pub to: Option<String>,
    pub offline: bool,
    pub json: bool,
    /// Add the weekday and hour-of-day breakdown.
    pub activity: bool,
}

/// One source's contribution to a report.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub id: String,
    pub category: String,
    pub color: String,
    pub event_count: usize,
    pub status: SourceStatus,
}

/// Computed report data.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub timezone: String,
    pub granularity: Granularity,
    pub group_by: GroupBy,
    pub rows: Vec<ReportRow>,
    pub summary: Vec<SummaryRow>,
    pub sources: Vec<SourceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<Vec<ActivityCell>>,
}

/// Outcomes with repeated sources dropped; a source listed twice must not
/// be counted twice.
fn distinct_outcomes(outcomes: &[SourceOutcome]) -> Vec<&SourceOutcome> {
    let mut seen = HashSet::new();
    outcomes
        .iter()
        .filter(|outcome| {
            let first = seen.insert(&outcome.source.id);
            if !first {
                debug!(source = %outcome.source.display_name, "skipping repeated source");
            }
            first
        })
        .collect()
}

fn outcome_events(outcomes: &[&SourceOutcome]) -> Vec<Event> {
    outcomes
        .iter()
        .flat_map(|outcome| outcome.events.iter().cloned())
        .collect()
}

/// Apportions every outcome's events over `window` and aggregates them.
pub fn build_report(
    outcomes: &[SourceOutcome],
    window: &ReportWindow,
    granularity: Granularity,
    group_by: GroupBy,
    tz: Tz,
) -> ReportData {
    let outcomes = distinct_outcomes(outcomes);
    let events = outcome_events(&outcomes);
    let sources: Vec<Source> = outcomes.iter().map(|o| o.source.clone()).collect();

    let apportionment = apportion(&events, window, granularity, tz);
    let rows = aggregate(&apportionment, &events, &sources, group_by);
    let summary = summarize(&apportionment, &events, &sources, group_by);

    let first_day = window.start().with_timezone(&tz).date_naive();
    // The window end is exclusive midnight after the last day.
    let last_day = (window.end() - Duration::seconds(1))
        .with_timezone(&tz)
        .date_naive()
        .max(first_day);

    ReportData {
        first_day,
        last_day,
        timezone: tz.name().to_string(),
        granularity,
        group_by,
        rows,
        summary,
        sources: outcomes
            .iter()
            .map(|outcome| SourceReport {
                name: outcome.source.display_name.clone(),
                id: outcome.source.id.to_string(),
                category: outcome.source.category.clone(),
                color: outcome.source.color.clone(),
                event_count: outcome.events.len(),
                status: outcome.status.clone(),
            })
            .collect(),
        activity: None,
    }
}

/// Weekday and hour-of-day pattern of the outcomes' events in `window`.
pub fn build_activity(
    outcomes: &[SourceOutcome],
    window: &ReportWindow,
    tz: Tz,
) -> Vec<ActivityCell> {
    activity(&outcome_events(&distinct_outcomes(outcomes)), window, tz)
}

/// Renders the report as aligned text tables.
pub fn write_report<W: Write>(writer: &mut W, data: &ReportData) -> Result<()> {
    writeln!(
        writer,
        "CALENDAR REPORT: {} to {} ({})",
        data.first_day, data.last_day, data.timezone
    )?;
    writeln!(
        writer,
        "Granularity: {}, grouped by {}",
        data.granularity, data.group_by
    )?;
    writeln!(writer)?;

    if data.rows.is_empty() {
        writeln!(writer, "No events in this window.")?;
    } else {
        write_rows(writer, &data.rows)?;
        writeln!(writer)?;
        writeln!(writer, "SUMMARY")?;
        write_summary(writer, &data.summary)?;
    }

    if let Some(cells) = &data.activity {
        writeln!(writer)?;
        writeln!(writer, "ACTIVITY")?;
        write_activity(writer, cells)?;
    }

    let degraded: Vec<&SourceReport> = data
        .sources
        .iter()
        .filter(|source| source.status.is_degraded())
        .collect();
    if !degraded.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "WARNINGS")?;
        for source in degraded {
            writeln!(writer, "{}: {}", source.name, source.status)?;
        }
    }
    Ok(())
}

fn column_width<'a>(header: &str, values: impl Iterator<Item = &'a str>) -> usize {
    values.map(str::len).fold(header.len(), usize::max)
}

fn write_rows<W: Write>(writer: &mut W, rows: &[ReportRow]) -> Result<()> {
    let bw = column_width("BUCKET", rows.iter().map(|r| r.bucket_label.as_str()));
    let gw = column_width("GROUP", rows.iter().map(|r| r.group_label.as_str()));

    writeln!(
        writer,
        "{:<bw$}  {:<gw$}  {:>8}  {:>6}",
        "BUCKET", "GROUP", "HOURS", "%"
    )?;
    for row in rows {
        writeln!(
            writer,
            "{:<bw$}  {:<gw$}  {:>8.2}  {:>6.1}",
            row.bucket_label, row.group_label, row.duration_hours, row.percent
        )?;
    }
    Ok(())
}

fn write_summary<W: Write>(writer: &mut W, summary: &[SummaryRow]) -> Result<()> {
    let gw = column_width("GROUP", summary.iter().map(|r| r.group_label.as_str()));

    writeln!(
        writer,
        "{:<gw$}  {:>8}  {:>8}  {:>6}  {:>6}",
        "GROUP", "TOTAL", "MEAN", "EVENTS", "%"
    )?;
    for row in summary {
        writeln!(
            writer,
            "{:<gw$}  {:>8.2}  {:>8.2}  {:>6}  {:>6.1}",
            row.group_label, row.total_hours, row.mean_hours, row.event_count, row.percent
        )?;
    }
    Ok(())
}

fn write_activity<W: Write>(writer: &mut W, cells: &[ActivityCell]) -> Result<()> {
    if cells.is_empty() {
        writeln!(writer, "No events started in this window.")?;
        return Ok(());
    }
    writeln!(writer, "{:<3}  {:<5}  {:>8}", "DAY", "HOUR", "HOURS")?;
    for cell in cells {
        writeln!(
            writer,
            "{:<3}  {:02}:00  {:>8.2}",
            cell.weekday, cell.hour, cell.hours
        )?;
    }
    Ok(())
}

pub fn run<W: Write>(writer: &mut W, config: &Config, args: &ReportArgs) -> Result<()> {
    let tz = config.timezone()?;
    let today = Utc::now().with_timezone(&tz).date_naive();
    // An unusable window is rejected before any feed is touched.
    let window = resolve_window(args.from.as_deref(), args.to.as_deref(), today, tz)?;

    let outcomes = collect_outcomes(config, args.offline)?;
    let mut data = build_report(&outcomes, &window, args.granularity, args.group_by, tz);
    if args.activity {
        data.activity = Some(build_activity(&outcomes, &window, tz));
    }

    if args.json {
        let json = serde_json::to_string_pretty(&data).context("failed to serialize report")?;
        writeln!(writer, "{json}")?;
    } else {
        write_report(writer, &data)?;
    }
    Ok(())
}
