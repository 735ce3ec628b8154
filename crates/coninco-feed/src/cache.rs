//! Download-or-reuse policy for feed text.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::store::BlobStore;
use crate::transport::Transport;
use crate::FetchError;

/// Feed text cache in front of a [`Transport`].
///
/// Fetches for the same key are serialized, so a download and a concurrent
/// read of the same cache slot never interleave.
#[derive(Debug)]
pub struct FeedCache<T, S> {
    transport: T,
    store: S,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<T, S> FeedCache<T, S>
where
    T: Transport,
    S: BlobStore,
{
    pub fn new(transport: T, store: S) -> Self {
        Self {
            transport,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the feed text for `key`.
    ///
    /// With `overwrite` unset and a cached copy present, the copy is returned
    /// and no request is made. Otherwise the feed is downloaded from `url`
    /// and stored under `key`. A failed download leaves the cached copy as it
    /// was.
    pub async fn fetch(&self, url: &str, key: &str, overwrite: bool) -> Result<String, FetchError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        if !overwrite {
            let cached = self.store.read(key).map_err(|source| FetchError::CacheRead {
                key: key.to_string(),
                source,
            })?;
            if let Some(text) = cached {
                tracing::debug!(key, "using cached feed");
                return Ok(text);
            }
        }

        let text = self.transport.get_text(url).await?;
        self.store
            .write(key, &text)
            .map_err(|source| FetchError::CacheWrite {
                key: key.to_string(),
                source,
            })?;
        tracing::info!(key, bytes = text.len(), "feed refreshed");
        Ok(text)
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}
