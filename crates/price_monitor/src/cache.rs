use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::types::PriceCheckResult;

struct CachedPrice {
    result: PriceCheckResult,
    stored_at: Instant,
}

/// Bounded LRU cache of fares with a time-to-live checked on read.
pub struct PriceCache {
    entries: Mutex<LruCache<String, CachedPrice>>,
    ttl: Duration,
}

impl PriceCache {
    /// Creates a cache holding at most `capacity` routes.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Fresh fare for `key`, marked as cached. Expired entries are dropped.
    pub async fn get(&self, key: &str) -> Option<PriceCheckResult> {
        let mut entries = self.entries.lock().await;

        let expired = match entries.peek(key) {
            Some(entry) => entry.stored_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            entries.pop(key);
            return None;
        }

        entries.get(key).map(|entry| PriceCheckResult {
            cached: true,
            ..entry.result.clone()
        })
    }

    /// Stores a freshly fetched fare.
    pub async fn insert(&self, key: String, result: PriceCheckResult) {
        self.entries.lock().await.put(
            key,
            CachedPrice {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of cached routes, including expired ones not yet read.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
