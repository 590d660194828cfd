use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// A cached value together with when it was cached.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub cached_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Whether the entry is younger than `ttl`. Freshness is the caller's
    /// decision; the cache never evicts on read.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() <= ttl
    }
}

/// A generic time-boxed key/value cache.
///
/// `get` returns the entry with its timestamp (or a miss); the caller applies
/// its own freshness predicate via [`CacheEntry::is_fresh`].
pub struct TimedCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn set(&self, key: K, value: V) {
        self.entries.lock().await.insert(
            key,
            CacheEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }
}

impl<K, V> Default for TimedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
