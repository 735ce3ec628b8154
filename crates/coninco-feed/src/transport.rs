//! HTTP access to remote feeds.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::FetchError;

/// Default request timeout for feed downloads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("coninco/", env!("CARGO_PKG_VERSION"));

/// Something that can download a feed document as text.
pub trait Transport {
    fn get_text(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Plain HTTP GET transport.
///
/// # Thread Safety
///
/// The transport is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send {
        let url = normalize_feed_url(url);
        async move {
            let request_error = |source: reqwest::Error| FetchError::Request {
                url: url.clone(),
                source,
            };

            let response = self.http.get(&url).send().await.map_err(&request_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.clone(),
                    status: status.as_u16(),
                });
            }
            let body = response.text().await.map_err(&request_error)?;
            tracing::debug!(%url, bytes = body.len(), "downloaded feed");
            Ok(body)
        }
    }
}

/// Rewrites `webcal://` subscription links to `https://`.
pub fn normalize_feed_url(url: &str) -> String {
    url.strip_prefix("webcal://").map_or_else(
        || url.to_string(),
        |rest| format!("https://{rest}"),
    )
}
