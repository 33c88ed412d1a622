//! Refresh command: fetch every feed and reconcile it into the cache.

use std::fmt;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use ctt_core::{Event, Source, SourceId, normalize};
use ctt_feed::{Fetcher, HttpFetcher, ParsedFeed, parse_feed};
use ctt_store::{CacheStore, ReconcileError};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::commands::util::open_store;
use crate::config::{Config, SourceConfig};

/// How current a source's events are after a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Fetched and persisted this cycle.
    Fresh,
    /// Read from the cache without fetching.
    Cached,
    /// The fetch failed; the events are whatever was cached before.
    Stale(String),
    /// Fetched and merged, but the merged set could not be written.
    NotPersisted(String),
}

impl SourceStatus {
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Stale(_) | Self::NotPersisted(_))
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Cached => write!(f, "cached"),
            Self::Stale(reason) => write!(f, "stale: {reason}"),
            Self::NotPersisted(reason) => write!(f, "not persisted: {reason}"),
        }
    }
}

/// The result of one source's cycle.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: Source,
    pub events: Vec<Event>,
    pub status: SourceStatus,
    /// Feed entries dropped while parsing or normalizing.
    pub skipped: usize,
}

/// Normalizes a parsed feed for `source_id`, returning the events and the
/// number of entries that had to be dropped.
pub fn normalize_feed(feed: &ParsedFeed, source_id: &SourceId, tz: Tz) -> (Vec<Event>, usize) {
    let mut skipped = feed.skipped;
    let mut events = Vec::with_capacity(feed.events.len());
    for raw in &feed.events {
        match normalize(raw, source_id, tz) {
            Ok(event) => events.push(event),
            Err(err) => {
                debug!(source = %source_id, uid = ?raw.uid, error = %err, "skipping event");
                skipped += 1;
            }
        }
    }
    (events, skipped)
}

/// Fetches, parses and reconciles every source in parallel.
///
/// Failures stay scoped to their source: a failed fetch reports the cached
/// events as stale, a failed write still returns the merged events.
pub fn refresh_all(
    store: &CacheStore,
    fetcher: &dyn Fetcher,
    sources: &[SourceConfig],
    tz: Tz,
    now: DateTime<Utc>,
) -> Vec<SourceOutcome> {
    let total = sources.len();
    sources
        .par_iter()
        .enumerate()
        .map(|(index, config)| refresh_one(store, fetcher, config, index, total, tz, now))
        .collect()
}

fn refresh_one(
    store: &CacheStore,
    fetcher: &dyn Fetcher,
    config: &SourceConfig,
    index: usize,
    total: usize,
    tz: Tz,
    now: DateTime<Utc>,
) -> SourceOutcome {
    let feed = fetcher
        .fetch(&config.address)
        .and_then(|content| parse_feed(&content));

    let feed = match feed {
        Ok(feed) => feed,
        Err(err) => {
            let source = config.resolve(index, total, None);
            warn!(source = %source.display_name, error = %err, "feed unavailable, using cache");
            let events = store.load(&source.id);
            return SourceOutcome {
                source,
                events,
                status: SourceStatus::Stale(err.to_string()),
                skipped: 0,
            };
        }
    };

    let source = config.resolve(index, total, feed.calendar_name.as_deref());
    let (fresh, skipped) = normalize_feed(&feed, &source.id, tz);
    info!(
        source = %source.display_name,
        fetched = fresh.len(),
        skipped,
        "fetched feed"
    );

    match store.reconcile(&source.id, fresh, now) {
        Ok(events) => SourceOutcome {
            source,
            events,
            status: SourceStatus::Fresh,
            skipped,
        },
        Err(ReconcileError::Persist { events, source: err, .. }) => SourceOutcome {
            source,
            events,
            status: SourceStatus::NotPersisted(err.to_string()),
            skipped,
        },
    }
}

/// Reads every source's cached events without fetching.
pub fn load_cached(store: &CacheStore, sources: &[SourceConfig]) -> Vec<SourceOutcome> {
    let total = sources.len();
    sources
        .iter()
        .enumerate()
        .map(|(index, config)| {
            let source = config.resolve(index, total, None);
            let events = store.load(&source.id);
            SourceOutcome {
                source,
                events,
                status: SourceStatus::Cached,
                skipped: 0,
            }
        })
        .collect()
}

/// Refreshes using the configured store, fetcher and timezone.
pub fn collect_outcomes(config: &Config, offline: bool) -> Result<Vec<SourceOutcome>> {
    let store = open_store(config)?;
    let sources = config.distinct_sources();
    if offline {
        return Ok(load_cached(&store, &sources));
    }
    let fetcher =
        HttpFetcher::new(config.fetch_timeout()).context("failed to create feed fetcher")?;
    let tz = config.timezone()?;
    Ok(refresh_all(&store, &fetcher, &sources, tz, Utc::now()))
}

/// Writes one status line per source.
pub fn write_outcomes<W: Write>(writer: &mut W, outcomes: &[SourceOutcome]) -> Result<()> {
    for outcome in outcomes {
        write!(
            writer,
            "{}: {} events ({})",
            outcome.source.display_name,
            outcome.events.len(),
            outcome.status
        )?;
        if outcome.skipped > 0 {
            write!(writer, ", {} skipped", outcome.skipped)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    if config.sources.is_empty() {
        writeln!(writer, "No sources configured.")?;
        return Ok(());
    }
    let outcomes = collect_outcomes(config, false)?;
    write_outcomes(writer, &outcomes)
}
