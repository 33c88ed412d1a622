//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ctt_core::{Granularity, GroupBy};

/// Calendar time tracker.
///
/// Pulls ICS calendar feeds into a local per-source cache and reports how
/// time splits across calendars by day, week or month.
#[derive(Debug, Parser)]
#[command(name = "ctt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch every configured feed and merge it into the cache.
    Refresh,

    /// Report time per calendar across buckets.
    Report {
        /// Bucket size: day, week or month.
        #[arg(short, long, default_value_t = Granularity::Month)]
        granularity: Granularity,

        /// Group rows by source or category.
        #[arg(long, default_value_t = GroupBy::Source)]
        group_by: GroupBy,

        /// First day of the window (YYYY-MM-DD, YYYY-MM or "N months ago").
        #[arg(long)]
        from: Option<String>,

        /// Last day of the window (YYYY-MM-DD, YYYY-MM or "N days ago").
        #[arg(long)]
        to: Option<String>,

        /// Report from the cache without fetching feeds.
        #[arg(long)]
        offline: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,

        /// Also break hours down by weekday and hour of day.
        #[arg(long)]
        activity: bool,
    },

    /// Find events by title.
    ///
    /// Matching ignores case; `*` matches any run of characters.
    Search {
        /// Title query; empty matches every event.
        #[arg(default_value = "")]
        pattern: String,

        /// Only search this source (name or address). Repeatable.
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Only search sources in this category. Repeatable.
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Only events on or after this day.
        #[arg(long)]
        from: Option<String>,

        /// Only events on or before this day.
        #[arg(long)]
        to: Option<String>,

        /// Search the cache without fetching feeds.
        #[arg(long)]
        offline: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Merge a local ICS file into a source's cache.
    Import {
        /// Source name or address to import into.
        #[arg(long)]
        source: String,

        /// The ICS file.
        file: PathBuf,
    },

    /// Inspect or clear the event cache.
    #[command(subcommand)]
    Cache(CacheAction),

    /// List configured sources.
    Sources,
}

/// Cache administration actions.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show cached partitions and their event counts.
    Status,

    /// Delete cached events.
    Clear {
        /// Only clear this source (name or address).
        #[arg(long)]
        source: Option<String>,
    },
}
