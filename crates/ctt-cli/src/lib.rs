//! Calendar time tracker CLI library.
//!
//! This crate provides the CLI interface for the calendar time tracker.

mod cli;
pub mod commands;
mod config;

pub use cli::{CacheAction, Cli, Commands};
pub use config::{CacheBackendKind, Config, SourceConfig};
