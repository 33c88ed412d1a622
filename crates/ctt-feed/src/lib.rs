//! ICS feed access for the calendar time tracker.
//!
//! Provides:
//! - Fetching: HTTP(S), `webcal://`, `file://` and plain paths
//! - Parsing: ICS text to [`ctt_core::RawEvent`]s ready for normalization

mod fetch;
mod parse;

use std::path::PathBuf;

use thiserror::Error;

pub use fetch::{DEFAULT_TIMEOUT, FeedLocation, Fetcher, HttpFetcher};
pub use parse::{ParsedFeed, parse_feed};

/// Feed errors.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed, including timeouts.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    /// A local feed file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The address is not a usable URL.
    #[error("invalid feed address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    /// The URL scheme is not one we can fetch.
    #[error("unsupported feed scheme: {0}")]
    UnsupportedScheme(String),
    /// The content is not an iCalendar document.
    #[error("unparseable calendar: {0}")]
    Parse(String),
}
