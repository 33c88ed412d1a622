//! Search command: list events whose titles match a query.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use ctt_core::{Event, SearchFilter, SearchResult, Source, TitlePattern, search};

use crate::Config;
use crate::commands::refresh::collect_outcomes;
use crate::commands::util::{find_source, resolve_window};

/// Search arguments as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub pattern: String,
    /// Source names or addresses; empty searches every source.
    pub sources: Vec<String>,
    pub categories: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub offline: bool,
    pub json: bool,
}

/// Turns the command-line arguments into a pattern and filter.
///
/// Without `--from` or `--to` the whole cache is searched.
pub fn build_query(
    config: &Config,
    args: &SearchArgs,
    tz: Tz,
) -> Result<(TitlePattern, SearchFilter)> {
    let pattern = TitlePattern::new(&args.pattern)?;

    let source_ids = args
        .sources
        .iter()
        .map(|key| {
            let (index, source) = find_source(config, key)?;
            Ok(source.resolve(index, config.sources.len(), None).id)
        })
        .collect::<Result<Vec<_>>>()?;

    let window = if args.from.is_some() || args.to.is_some() {
        let today = Utc::now().with_timezone(&tz).date_naive();
        Some(resolve_window(args.from.as_deref(), args.to.as_deref(), today, tz)?)
    } else {
        None
    };

    Ok((
        pattern,
        SearchFilter {
            source_ids,
            categories: args.categories.clone(),
            window,
        },
    ))
}

/// Renders the totals line and one row per hit, times in `tz`.
pub fn write_results<W: Write>(writer: &mut W, result: &SearchResult, tz: Tz) -> Result<()> {
    if result.hits.is_empty() {
        writeln!(writer, "No matching events.")?;
        return Ok(());
    }
    writeln!(
        writer,
        "{} events, {:.2} hours total, {:.2} hours average",
        result.count, result.total_hours, result.mean_hours
    )?;
    writeln!(writer)?;

    let rows: Vec<[String; 5]> = result
        .hits
        .iter()
        .map(|hit| {
            [
                hit.start.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
                hit.end.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
                format!("{:.2}", hit.duration_hours),
                hit.source.clone(),
                hit.title.clone(),
            ]
        })
        .collect();
    let sw = rows
        .iter()
        .map(|row| row[3].len())
        .fold("SOURCE".len(), usize::max);

    writeln!(
        writer,
        "{:<16}  {:<16}  {:>6}  {:<sw$}  TITLE",
        "START", "END", "HOURS", "SOURCE"
    )?;
    for [start, end, hours, source, title] in rows {
        writeln!(writer, "{start:<16}  {end:<16}  {hours:>6}  {source:<sw$}  {title}")?;
    }
    Ok(())
}

pub fn run<W: Write>(writer: &mut W, config: &Config, args: &SearchArgs) -> Result<()> {
    let tz = config.timezone()?;
    let (pattern, filter) = build_query(config, args, tz)?;

    let outcomes = collect_outcomes(config, args.offline)?;
    let events: Vec<Event> = outcomes
        .iter()
        .flat_map(|outcome| outcome.events.iter().cloned())
        .collect();
    let sources: Vec<Source> = outcomes.into_iter().map(|o| o.source).collect();
    let result = search(&events, &sources, &pattern, &filter);

    if args.json {
        let json =
            serde_json::to_string_pretty(&result).context("failed to serialize search results")?;
        writeln!(writer, "{json}")?;
    } else {
        write_results(writer, &result, tz)?;
    }
    Ok(())
}
