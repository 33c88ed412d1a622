//! CLI subcommand implementations.

pub mod cache;
pub mod import;
pub mod refresh;
pub mod report;
pub mod search;
pub mod sources;
pub mod util;
