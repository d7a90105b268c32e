// In-memory TTL cache store.
// Bounded LRU map whose entries expire a fixed duration after insertion.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use super::clock::{Clock, SystemClock};

/// Default TTL for aggregated results: 10 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Wrapper for cached data with metadata.
#[derive(Debug, Clone)]
pub struct CachedData<T> {
    /// The cached data.
    pub data: T,
    /// When the data was cached.
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T, cached_at: DateTime<Utc>) -> Self {
        Self { data, cached_at }
    }

    /// Check if this cached data has expired at `now`.
    ///
    /// A timestamp in the future (clock stepped backwards) counts as expired.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let elapsed = now
            .signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or(Duration::MAX);

        elapsed >= ttl
    }

    pub fn is_valid(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        !self.is_expired(ttl, now)
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub valid_entries: usize,
    pub capacity: usize,
}

/// Thread-safe TTL cache with least-recently-used eviction.
///
/// Values are cloned out on read, so a reader never observes a partially
/// replaced entry.
pub struct TtlCache<K, V, C = SystemClock> {
    entries: Mutex<LruCache<K, CachedData<V>>>,
    ttl: Duration,
    clock: C,
}

impl<K: Hash + Eq + Clone, V: Clone> TtlCache<K, V, SystemClock> {
    /// Creates a cache on the wall clock.
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, SystemClock)
    }
}

impl<K: Hash + Eq + Clone, V: Clone, C: Clock> TtlCache<K, V, C> {
    /// Creates a cache driven by the given clock.
    pub fn with_clock(capacity: NonZeroUsize, ttl: Duration, clock: C) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    /// Returns the value for `key` if present and not expired.
    ///
    /// An expired entry is dropped on the way out.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        // A `cached_at` ahead of `now` (clock stepped back) is treated as expired.
        if entries.get(key)?.is_expired(self.ttl, now) {
            entries.pop(key);
            debug!("evicted expired cache entry");
            return None;
        }
        entries.peek(key).map(|cached| cached.data.clone())
    }

    /// Inserts or replaces the value for `key`, stamped with the current time.
    ///
    /// When the cache is full, expired entries go first; if none are, the
    /// least recently used entry is evicted.
    pub fn put(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let replacing = entries.contains(&key);
        if !replacing && entries.len() >= entries.cap().get() {
            let purged = purge(&mut entries, self.ttl, now);
            if purged > 0 {
                debug!(purged, "purged expired cache entries before insert");
            }
        }

        let displaced = entries.push(key, CachedData::new(value, now));
        if let Some((_, evicted)) = displaced {
            if !replacing {
                debug!(cached_at = %evicted.cached_at, "evicted least recently used cache entry");
            }
        }
    }

    /// Removes the entry for `key`, returning its value if it was still valid.
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .lock()
            .pop(key)
            .filter(|cached| cached.is_valid(self.ttl, now))
            .map(|cached| cached.data)
    }

    /// Clears all cached entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Removes all expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        purge(&mut self.entries.lock(), self.ttl, now)
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.entries.lock();
        let expired = entries
            .iter()
            .filter(|(_, cached)| cached.is_expired(self.ttl, now))
            .count();
        CacheStats {
            total_entries: entries.len(),
            expired_entries: expired,
            valid_entries: entries.len() - expired,
            capacity: entries.cap().get(),
        }
    }
}

fn purge<K: Hash + Eq + Clone, V>(
    entries: &mut LruCache<K, CachedData<V>>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> usize {
    // LRU order tracks access, not insertion, so every entry is checked.
    let stale: Vec<K> = entries
        .iter()
        .filter(|(_, cached)| cached.is_expired(ttl, now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &stale {
        entries.pop(key);
    }
    stale.len()
}
