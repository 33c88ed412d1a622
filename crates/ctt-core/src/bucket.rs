//! Reporting windows and the buckets that tile them.
//!
//! Bucket boundaries are computed on local calendar dates in the reporting
//! timezone and converted to UTC independently, so 23- and 25-hour days are
//! handled without drift.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::local_midnight;

/// Errors for an unusable reporting window.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("reporting window starts ({start}) after it ends ({end})")]
    StartAfterEnd { start: String, end: String },
}

/// Bucket size used to tile a reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    /// ISO 8601 weeks, Monday through Sunday.
    Week,
    #[default]
    Month,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Granularity {
    type Err = UnknownGranularity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            _ => Err(UnknownGranularity(s.to_string())),
        }
    }
}

/// Error type for unknown granularity strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown granularity: {0} (expected day, week or month)")]
pub struct UnknownGranularity(String);

/// A half-open reporting window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ReportWindow {
    /// Creates a window, rejecting one that starts after it ends.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::StartAfterEnd {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Covers whole local days from `first_day` through `last_day` inclusive.
    pub fn from_dates(first_day: NaiveDate, last_day: NaiveDate, tz: Tz) -> Result<Self, WindowError> {
        if first_day > last_day {
            return Err(WindowError::StartAfterEnd {
                start: first_day.to_string(),
                end: last_day.to_string(),
            });
        }
        Self::new(
            local_midnight(tz, first_day),
            local_midnight(tz, last_day + Duration::days(1)),
        )
    }

    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether `[start, end)` touches the window. A zero-length span counts
    /// when its instant lies inside the window.
    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if start == end {
            self.start <= start && start < self.end
        } else {
            start < self.end && end > self.start
        }
    }
}

/// A half-open interval of one granularity, clipped to the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    /// Chronologically sortable label (`2024-01-31`, `2024-W05`, `2024-01`).
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Generates the ordered buckets that exactly tile `window`.
///
/// The first and last buckets are clipped to the window edges. An empty
/// window yields no buckets.
pub fn buckets(window: &ReportWindow, granularity: Granularity, tz: Tz) -> Vec<Bucket> {
    let mut buckets = Vec::new();
    let mut cursor = window.start;

    while cursor < window.end {
        let local_date = cursor.with_timezone(&tz).date_naive();
        let period_start = period_start(local_date, granularity);
        let period_end = local_midnight(tz, next_period_start(period_start, granularity));
        // Guards against a boundary that fails to advance; the remainder becomes one bucket.
        let end = if period_end > cursor {
            period_end.min(window.end)
        } else {
            window.end
        };

        buckets.push(Bucket {
            label: label(period_start, granularity),
            start: cursor,
            end,
        });
        cursor = end;
    }

    buckets
}

/// First local date of the period containing `date`.
fn period_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => date,
        Granularity::Week => {
            date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
        }
        Granularity::Month => date.with_day(1).unwrap_or(date),
    }
}

fn next_period_start(start: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => start + Duration::days(1),
        Granularity::Week => start + Duration::days(7),
        Granularity::Month => {
            let (year, month) = if start.month() == 12 {
                (start.year() + 1, 1)
            } else {
                (start.year(), start.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(start + Duration::days(31))
        }
    }
}

fn label(period_start: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => period_start.format("%Y-%m-%d").to_string(),
        Granularity::Week => {
            let week = period_start.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Granularity::Month => period_start.format("%Y-%m").to_string(),
    }
}
