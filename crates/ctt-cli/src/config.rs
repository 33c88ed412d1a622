//! Configuration loading and management.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono_tz::Tz;
use ctt_core::{
    DEFAULT_RECENCY_DAYS, ReconcilePolicy, Source, SourceId, UNNAMED, distinct_color,
};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Default feed download timeout in seconds.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Which backend persists the event cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// One CSV file per source under `cache_dir`.
    #[default]
    File,
    /// One SQLite database at `database_path`.
    Sqlite,
}

/// One configured calendar feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Feed URL (`https://`, `webcal://`, `file://`) or local path.
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl SourceConfig {
    /// Builds the runtime source.
    ///
    /// The name falls back to the feed's advertised calendar name, then to
    /// [`UNNAMED`]. The color falls back to the `index`-th of `total` hues.
    pub fn resolve(&self, index: usize, total: usize, feed_name: Option<&str>) -> Source {
        let name = self
            .name
            .as_deref()
            .or(feed_name)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNNAMED);
        let color = self
            .color
            .clone()
            .unwrap_or_else(|| distinct_color(index, total));
        Source::new(self.address.clone(), name, self.category.clone(), color)
    }
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub cache_backend: CacheBackendKind,
    /// Directory for the file backend.
    pub cache_dir: PathBuf,
    /// Database file for the SQLite backend.
    pub database_path: PathBuf,
    /// Recency window for reconciliation; `0` disables it.
    pub recency_days: u32,
    pub fetch_timeout_secs: u64,
    /// IANA timezone for floating times and bucket boundaries.
    pub timezone: Option<String>,
    pub sources: Vec<SourceConfig>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("cache_backend", &self.cache_backend)
            .field("cache_dir", &self.cache_dir)
            .field("database_path", &self.database_path)
            .field("recency_days", &self.recency_days)
            .field("timezone", &self.timezone)
            .field("sources", &self.sources.len())
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            cache_backend: CacheBackendKind::default(),
            cache_dir: data_dir.join("cache"),
            database_path: data_dir.join("cache.db"),
            recency_days: DEFAULT_RECENCY_DAYS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            timezone: None,
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // CTT_* environment variables
        figment = figment.merge(Env::prefixed("CTT_"));

        figment.extract()
    }

    /// Reconciliation policy derived from `recency_days`.
    pub const fn policy(&self) -> ReconcilePolicy {
        ReconcilePolicy::from_recency_days(self.recency_days)
    }

    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// The reporting timezone: configured, else the system zone, else UTC.
    pub fn timezone(&self) -> anyhow::Result<Tz> {
        if let Some(name) = &self.timezone {
            return name
                .parse::<Tz>()
                .map_err(|err| anyhow::anyhow!("{err}"))
                .with_context(|| format!("invalid timezone in configuration: {name}"));
        }
        let system = iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string());
        Ok(system.parse::<Tz>().unwrap_or(Tz::UTC))
    }

    /// The configured sources with repeated addresses dropped.
    ///
    /// Two entries for the same address share a [`SourceId`] and therefore
    /// one cache partition; only the first one is kept.
    pub fn distinct_sources(&self) -> Vec<SourceConfig> {
        let mut seen = HashSet::new();
        self.sources
            .iter()
            .filter(|source| {
                let fresh = seen.insert(SourceId::from_address(&source.address));
                if !fresh {
                    tracing::warn!(address = %source.address, "ignoring duplicate source");
                }
                fresh
            })
            .cloned()
            .collect()
    }

    /// Resolves every configured source without feed-provided names.
    pub fn resolved_sources(&self) -> Vec<Source> {
        let total = self.sources.len();
        self.sources
            .iter()
            .enumerate()
            .map(|(index, source)| source.resolve(index, total, None))
            .collect()
    }
}

/// Returns the platform-specific config directory for ctt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ctt"))
}

/// Returns the platform-specific data directory for ctt.
///
/// On Linux: `~/.local/share/ctt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ctt"))
}
