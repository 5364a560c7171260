//! L0: the backend response cache.
//!
//! Caches raw response bytes behind a configurable TTL and guarantees byte
//! identity (`Arc::ptr_eq`) of returned slices across hits within a TTL
//! window — this identity is the fast path the parsed-message cache (L1)
//! relies on.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::BackendError;

/// Identifies a cacheable backend response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Conversation(String),
    ConversationList,
    ModelList,
}

struct Entry {
    bytes: Arc<Vec<u8>>,
    expires_at: Instant,
}

/// The response cache. When `ttl` is zero, every call is a pass-through and
/// nothing is retained.
pub struct ResponseCache {
    entries: DashMap<CacheKey, Entry>,
    ttl: Duration,
}

impl ResponseCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Returns the cached bytes for `key` if present and unexpired, calling
    /// `fetch` and storing its result otherwise.
    ///
    /// # Errors
    ///
    /// Propagates whatever error `fetch` returns.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
    ) -> Result<Arc<Vec<u8>>, BackendError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, BackendError>>,
    {
        if self.ttl.is_zero() {
            return fetch().await.map(Arc::new);
        }

        if let Some(entry) = self.entries.get(&key) {
            if entry.expires_at > Instant::now() {
                return Ok(Arc::clone(&entry.bytes));
            }
        }

        let bytes = Arc::new(fetch().await?);
        self.entries.insert(
            key,
            Entry {
                bytes: Arc::clone(&bytes),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(bytes)
    }

    /// Drops the entry for `key`, if any. Called in lockstep with every
    /// mutating backend call that succeeds.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(key);
    }
}
