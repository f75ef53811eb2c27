//! Cache of rendered HTML pages.
//!
//! [`PageCache`] is a cache-aside layer keyed by request path. Reads go
//! straight to the primary store; every write also records its key in a side
//! index so cached pages can be enumerated and invalidated in bulk.
//!
//! - A miss is the normal trigger for rendering, never an error for callers
//! - Backend failures degrade to a miss (reads) or a dropped write (writes)
//! - The index update is spawned and never awaited on the render path, so the
//!   index is a superset of live keys that may lag a write briefly

pub mod pages;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

pub use crate::Error;
use crate::db::Db;

/// Storage behind the page cache.
#[async_trait]
pub trait PageCacheBackend: Send + Sync + 'static {
    /// Fresh body for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Store `body` under `key`, replacing any previous value.
    async fn set(&self, key: &str, body: &str, ttl_seconds: i64) -> Result<(), Error>;

    /// Record `key` in the side index if absent.
    async fn add_to_index(&self, key: &str) -> Result<(), Error>;

    /// Every key in the side index.
    async fn index(&self) -> Result<Vec<String>, Error>;

    /// Delete entries and their index records. Returns the number of entries deleted.
    async fn remove(&self, keys: Vec<String>) -> Result<u64, Error>;

    /// Delete expired entries. Returns the number deleted.
    async fn purge_expired(&self) -> Result<u64, Error>;
}

#[async_trait]
impl PageCacheBackend for Db {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.get_page(key).await
    }

    async fn set(&self, key: &str, body: &str, ttl_seconds: i64) -> Result<(), Error> {
        self.put_page(key, body, ttl_seconds).await
    }

    async fn add_to_index(&self, key: &str) -> Result<(), Error> {
        self.index_page(key).await
    }

    async fn index(&self) -> Result<Vec<String>, Error> {
        self.indexed_pages().await
    }

    async fn remove(&self, keys: Vec<String>) -> Result<u64, Error> {
        self.delete_pages(keys).await
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        self.purge_expired_pages().await
    }
}

/// Handle to the index update spawned by [`PageCache::set`].
///
/// Dropping it leaves the update running in the background.
#[derive(Debug)]
pub struct IndexUpdate(Option<JoinHandle<()>>);

impl IndexUpdate {
    /// Wait until the index reflects the key (or the update has failed and been logged).
    pub async fn wait(self) {
        if let Some(handle) = self.0 {
            let _ = handle.await;
        }
    }
}

/// Page cache service, constructed once per process and shared by handlers.
#[derive(Clone)]
pub struct PageCache {
    backend: Arc<dyn PageCacheBackend>,
    ttl_seconds: i64,
}

impl PageCache {
    pub fn new(backend: Arc<dyn PageCacheBackend>, ttl_seconds: i64) -> Self {
        Self { backend, ttl_seconds }
    }

    /// Previously stored body for `key`.
    ///
    /// # Errors
    ///
    /// `Error::CacheMiss` if absent or expired; backend errors are passed through.
    pub async fn get(&self, key: &str) -> Result<String, Error> {
        self.backend
            .get(key)
            .await?
            .ok_or_else(|| Error::CacheMiss(key.to_string()))
    }

    /// Store `body` under `key`.
    ///
    /// Returns once the entry itself is written. Adding the key to the index
    /// happens on a spawned task; await the returned handle to observe it.
    /// Failures are logged and swallowed.
    pub async fn set(&self, key: &str, body: &str) -> IndexUpdate {
        if let Err(e) = self.backend.set(key, body, self.ttl_seconds).await {
            tracing::warn!(key, error = %e, "failed to store cached page");
            return IndexUpdate(None);
        }

        let backend = Arc::clone(&self.backend);
        let key = key.to_string();
        IndexUpdate(Some(tokio::spawn(async move {
            if let Err(e) = backend.add_to_index(&key).await {
                tracing::warn!(key = %key, error = %e, "failed to update page index");
            }
        })))
    }

    /// Serve `key` from the cache, or render, store, and return it.
    ///
    /// `render` runs only on a miss. Its errors are returned unchanged and
    /// nothing is stored.
    pub async fn get_or_render<F, Fut, E>(&self, key: &str, render: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        match self.get(key).await {
            Ok(body) => {
                tracing::debug!(key, "page cache hit");
                return Ok(body);
            }
            Err(Error::CacheMiss(_)) => tracing::debug!(key, "page cache miss"),
            Err(e) => tracing::debug!(key, error = %e, "page cache read failed, rendering"),
        }

        let body = render().await?;
        // Not awaited: the index catches up in the background.
        drop(self.set(key, &body).await);
        Ok(body)
    }

    /// Keys currently in the side index.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        self.backend.index().await
    }

    /// Remove every indexed page. Returns the number of cached pages deleted.
    pub async fn invalidate_all(&self) -> Result<u64, Error> {
        let keys = self.backend.index().await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted = self.backend.remove(keys).await?;
        tracing::debug!(deleted, "page cache invalidated");
        Ok(deleted)
    }

    /// Delete expired pages.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        self.backend.purge_expired().await
    }
}
