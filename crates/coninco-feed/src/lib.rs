//! Calendar feed retrieval for the coninco bot.
//!
//! Feeds are plain iCalendar documents served over HTTP. Each one is cached
//! as text under its feed name so that on-demand commands can reuse the last
//! download instead of hitting the network.

use std::io;

use thiserror::Error;

mod cache;
mod store;
mod transport;

pub use cache::FeedCache;
pub use store::{BlobStore, FsBlobStore};
pub use transport::{DEFAULT_TIMEOUT, HttpTransport, Transport, normalize_feed_url};

/// Feed retrieval errors.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed or timed out.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Server answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    /// Reading the cached copy failed.
    #[error("failed to read cached feed {key}: {source}")]
    CacheRead {
        key: String,
        #[source]
        source: io::Error,
    },
    /// Persisting the downloaded copy failed.
    #[error("failed to write cached feed {key}: {source}")]
    CacheWrite {
        key: String,
        #[source]
        source: io::Error,
    },
}
