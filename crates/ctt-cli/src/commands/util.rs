//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, Months, NaiveDate};
use chrono_tz::Tz;
use ctt_core::ReportWindow;
use ctt_store::{CacheStore, FileBackend, SqliteBackend};
use regex::Regex;

use crate::config::{CacheBackendKind, Config, SourceConfig};

/// Pre-compiled regex for relative date parsing.
static RELATIVE_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(day|week|month)s?\s+ago$").expect("relative date regex is valid")
});

/// Conservative bound for relative dates (~1000 years in days).
const MAX_RELATIVE_DAYS: u32 = 1000 * 366;

/// Number of months covered by the default reporting window.
const DEFAULT_WINDOW_MONTHS: u32 = 12;

/// Which end of the window a date argument describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// Parses a window bound relative to `today`.
///
/// Supports:
/// - Dates: "2024-01-15"
/// - Months: "2024-01" (first day as a start, last day as an end)
/// - Relative: "3 days ago", "2 weeks ago", "6 months ago", "today"
pub fn parse_date(s: &str, bound: Bound, today: NaiveDate) -> Result<NaiveDate> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("today") {
        return Ok(today);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(first) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        return Ok(match bound {
            Bound::Start => first,
            Bound::End => last_day_of_month(first),
        });
    }

    let lowered = s.to_ascii_lowercase();
    let Some(caps) = RELATIVE_DATE_RE.captures(&lowered) else {
        anyhow::bail!(
            "Invalid date: {s}. Use YYYY-MM-DD, YYYY-MM or relative (e.g., '3 months ago')"
        );
    };

    let n: u32 = caps[1]
        .parse()
        .context("failed to parse number in relative date")?;
    let unit = caps[2].to_string();

    let date = match unit.as_str() {
        "day" if n <= MAX_RELATIVE_DAYS => today.checked_sub_signed(Duration::days(i64::from(n))),
        "week" if n <= MAX_RELATIVE_DAYS / 7 => {
            today.checked_sub_signed(Duration::weeks(i64::from(n)))
        }
        "month" if n <= MAX_RELATIVE_DAYS / 31 => today.checked_sub_months(Months::new(n)),
        _ => None,
    };
    date.with_context(|| format!("Relative date value too large: {n} {unit}"))
}

/// Builds the reporting window from optional `--from`/`--to` arguments.
///
/// Defaults to the last twelve months through the end of the current one.
pub fn resolve_window(
    from: Option<&str>,
    to: Option<&str>,
    today: NaiveDate,
    tz: Tz,
) -> Result<ReportWindow> {
    let first = match from {
        Some(s) => parse_date(s, Bound::Start, today)?,
        None => first_day_of_month(today)
            .checked_sub_months(Months::new(DEFAULT_WINDOW_MONTHS - 1))
            .context("default window start out of range")?,
    };
    let last = match to {
        Some(s) => parse_date(s, Bound::End, today)?,
        None => last_day_of_month(today),
    };
    ReportWindow::from_dates(first, last, tz).context("invalid reporting window")
}

fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    first_day_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Opens the configured cache store, creating directories as needed.
pub fn open_store(config: &Config) -> Result<CacheStore> {
    let policy = config.policy();
    let store = match config.cache_backend {
        CacheBackendKind::File => {
            let backend = FileBackend::open(&config.cache_dir).with_context(|| {
                format!("failed to open cache at {}", config.cache_dir.display())
            })?;
            CacheStore::new(Box::new(backend), policy)
        }
        CacheBackendKind::Sqlite => {
            let backend = SqliteBackend::open(&config.database_path).with_context(|| {
                format!("failed to open cache at {}", config.database_path.display())
            })?;
            CacheStore::new(Box::new(backend), policy)
        }
    };
    Ok(store)
}

/// Finds a configured source by name, address or derived display name.
pub fn find_source<'a>(config: &'a Config, key: &str) -> Result<(usize, &'a SourceConfig)> {
    let key = key.trim();
    let resolved = config.resolved_sources();
    config
        .sources
        .iter()
        .enumerate()
        .find(|(index, source)| {
            source.address == key
                || source
                    .name
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(key))
                || resolved[*index].display_name.eq_ignore_ascii_case(key)
                || resolved[*index].id.as_str() == key
        })
        .with_context(|| format!("no configured source matches '{key}'"))
}
