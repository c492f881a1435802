//! In-process resolution cache
//!
//! Bounded LRU map with a per-entry lifetime. Checked first on every
//! resolve call and written last on every successful one.

use crate::model::CacheEntry;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Slot {
    entry: CacheEntry,
    expires_at: Instant,
}

/// Thread-safe LRU + TTL cache keyed by resolution key
pub struct MemoryCache {
    inner: Mutex<LruCache<String, Slot>>,
    ttl: Duration,
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` for `ttl` each
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Live entry for `key`, refreshing its recency; expired entries are dropped
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<CacheEntry> {
        let mut cache = self.inner.lock();
        let expired = match cache.get(key) {
            Some(slot) if slot.expires_at > now => return Some(slot.entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        None
    }

    /// Store `entry`, evicting the least recently used entries beyond capacity
    pub fn set(&self, key: impl Into<String>, entry: CacheEntry) {
        self.set_at(key.into(), entry, Instant::now());
    }

    fn set_at(&self, key: String, entry: CacheEntry, now: Instant) {
        let slot = Slot {
            entry,
            expires_at: now + self.ttl,
        };
        self.inner.lock().put(key, slot);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
