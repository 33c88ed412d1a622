//! Import command: merge a local ICS file into one source's cache.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use ctt_core::ReconcilePolicy;
use ctt_feed::parse_feed;

use crate::Config;
use crate::commands::refresh::normalize_feed;
use crate::commands::util::{find_source, open_store};

pub fn run<W: Write>(writer: &mut W, config: &Config, source_key: &str, file: &Path) -> Result<()> {
    let (index, source_config) = find_source(config, source_key)?;

    let content = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let feed = parse_feed(&content).with_context(|| format!("failed to parse {}", file.display()))?;

    let source = source_config.resolve(index, config.sources.len(), None);
    let tz = config.timezone()?;
    let (fresh, skipped) = normalize_feed(&feed, &source.id, tz);
    let imported = fresh.len();

    // A file is not the whole feed, so it only adds and replaces by UID.
    let store = open_store(config)?;
    let cached = store
        .reconcile_with(&source.id, fresh, ReconcilePolicy::Unbounded, Utc::now())
        .context("failed to import events")?;

    tracing::info!(source = %source.display_name, imported, skipped, "imported ICS file");
    write!(
        writer,
        "Imported {imported} events into {} ({} cached",
        source.display_name,
        cached.len()
    )?;
    if skipped > 0 {
        write!(writer, ", {skipped} skipped")?;
    }
    writeln!(writer, ")")?;
    Ok(())
}
