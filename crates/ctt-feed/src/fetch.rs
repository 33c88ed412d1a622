//! Feed retrieval.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::FeedError;

/// Default request timeout for feed downloads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that turns a feed address into ICS text.
///
/// A failure is final for the cycle; callers fall back to the cache.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, address: &str) -> Result<String, FeedError>;
}

/// Where a feed address points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLocation {
    Remote(Url),
    Local(PathBuf),
}

impl FeedLocation {
    /// Classifies an address.
    ///
    /// `webcal://` and `webcals://` are fetched over HTTPS. Addresses without
    /// a scheme are local paths.
    pub fn parse(address: &str) -> Result<Self, FeedError> {
        let address = address.trim();
        let Some((scheme, rest)) = address.split_once("://") else {
            return Ok(Self::Local(PathBuf::from(address)));
        };

        let invalid = |reason: String| FeedError::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => Url::parse(address)
                .map(Self::Remote)
                .map_err(|err| invalid(err.to_string())),
            "webcal" | "webcals" => Url::parse(&format!("https://{rest}"))
                .map(Self::Remote)
                .map_err(|err| invalid(err.to_string())),
            "file" => {
                let url = Url::parse(address).map_err(|err| invalid(err.to_string()))?;
                url.to_file_path()
                    .map(Self::Local)
                    .map_err(|()| invalid("not a local file path".to_string()))
            }
            other => Err(FeedError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Fetches feeds over HTTP(S) or from the local filesystem.
///
/// # Thread Safety
///
/// The fetcher can be shared across threads; all requests share one
/// connection pool.
pub struct HttpFetcher {
    http: reqwest::blocking::Client,
    timeout: Duration,
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ctt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FeedError::ClientBuild)?;
        Ok(Self { http, timeout })
    }

    fn fetch_remote(&self, url: &Url) -> Result<String, FeedError> {
        debug!(%url, "fetching feed");
        let response = self.http.get(url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text()?)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, address: &str) -> Result<String, FeedError> {
        match FeedLocation::parse(address)? {
            FeedLocation::Remote(url) => self.fetch_remote(&url),
            FeedLocation::Local(path) => read_local(path),
        }
    }
}

fn read_local(path: PathBuf) -> Result<String, FeedError> {
    debug!(path = %path.display(), "reading feed file");
    fs::read_to_string(&path).map_err(|source| FeedError::Read { path, source })
}
