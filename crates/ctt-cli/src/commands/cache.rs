//! Cache administration: status and clear.

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result};

use crate::Config;
use crate::commands::util::{find_source, open_store};
use crate::config::CacheBackendKind;

pub fn status<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let partitions = store.partitions().context("failed to list cache")?;

    match config.cache_backend {
        CacheBackendKind::File => writeln!(writer, "Cache: {}", config.cache_dir.display())?,
        CacheBackendKind::Sqlite => {
            writeln!(writer, "Cache: {}", config.database_path.display())?;
        }
    }

    if partitions.is_empty() {
        writeln!(writer, "No cached sources.")?;
        return Ok(());
    }

    let names: HashMap<_, _> = config
        .resolved_sources()
        .into_iter()
        .map(|source| (source.id, source.display_name))
        .collect();

    for partition in partitions {
        let name = names
            .get(&partition.source_id)
            .cloned()
            .unwrap_or_else(|| format!("(unconfigured) {}", partition.source_id));
        write!(writer, "- {name}: {} events", partition.event_count)?;
        if let (Some(first), Some(last)) = (partition.first_start, partition.last_end) {
            write!(
                writer,
                ", {} to {}",
                first.format("%Y-%m-%d"),
                last.format("%Y-%m-%d")
            )?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn clear<W: Write>(writer: &mut W, config: &Config, source_key: Option<&str>) -> Result<()> {
    let store = open_store(config)?;

    let Some(key) = source_key else {
        let removed = store.clear_all().context("failed to clear cache")?;
        writeln!(writer, "Cleared {removed} cached sources.")?;
        return Ok(());
    };

    let (index, source_config) = find_source(config, key)?;
    let source = source_config.resolve(index, config.sources.len(), None);
    if store.clear(&source.id).context("failed to clear cache")? {
        writeln!(writer, "Cleared cache for {}.", source.display_name)?;
    } else {
        writeln!(writer, "No cache for {}.", source.display_name)?;
    }
    Ok(())
}
