//! TTL + LRU key/value stores backing the extraction cache and the
//! correction store
//!
//! Expiry is lazy: an entry past `expires_at` is dropped when it is next read.
//! `purge_expired` exists for an optional background sweep but is never
//! needed for correctness.

use crate::types::{CorrectionEntry, ResolutionResult};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Fixed-capacity, least-recently-used map with per-entry TTL.
///
/// Safe to share between concurrent resolutions; every operation holds the
/// lock only for the map access itself.
pub struct TtlLruCache<T> {
    name: &'static str,
    default_ttl: Duration,
    inner: Mutex<LruCache<String, CacheEntry<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Normalized query -> last accepted model resolution (24h class)
pub type ExtractionCache = TtlLruCache<ResolutionResult>;

/// Normalized query -> user-confirmed correction (7 day class)
pub type CorrectionStore = TtlLruCache<CorrectionEntry>;

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub name: &'static str,
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl<T: Clone> TtlLruCache<T> {
    pub fn new(name: &'static str, capacity: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            default_ttl,
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Unexpired value for `key`, promoting it to most-recently-used
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let lookup = inner
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));
        let value = match lookup {
            Some(Some(v)) => Some(v),
            Some(None) => {
                inner.pop(key);
                debug!(cache = self.name, key, "Expired entry dropped on read");
                None
            }
            None => None,
        };
        drop(inner);

        match value {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace `key`, evicting the least-recently-used entry when full
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let key = key.into();
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let displaced = self.inner.lock().push(key.clone(), entry);
        if let Some((old_key, _)) = displaced {
            if old_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(cache = self.name, evicted = %old_key, "LRU eviction");
            }
        }
    }

    /// `set` with the store's default TTL
    pub fn insert(&self, key: impl Into<String>, value: T) {
        self.set(key, value, self.default_ttl);
    }

    pub fn remove(&self, key: &str) -> Option<T> {
        self.inner.lock().pop(key).map(|e| e.value)
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.pop(key);
        }
        expired.len()
    }

    /// Whether `key` holds an unexpired entry. Leaves recency and hit
    /// counters untouched.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .peek(key)
            .map_or(false, |entry| !entry.is_expired(now))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            name: self.name,
            entries: inner.len(),
            capacity: inner.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl TtlLruCache<ResolutionResult> {
    pub fn extraction(capacity: usize, ttl: Duration) -> Self {
        Self::new("extraction", capacity, ttl)
    }
}

impl TtlLruCache<CorrectionEntry> {
    pub fn corrections(capacity: usize, ttl: Duration) -> Self {
        Self::new("correction", capacity, ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_get_set() {
        let cache: TtlLruCache<u32> = TtlLruCache::new("t", 4, Duration::from_secs(60));
        assert_eq!(cache.get("a"), None);
        cache.insert("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("a", 2);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_lazy_expiry() {
        let cache: TtlLruCache<&str> = TtlLruCache::new("t", 4, Duration::from_secs(60));
        cache.set("short", "v", Duration::from_millis(10));
        cache.insert("long", "v");
        std::thread::sleep(Duration::from_millis(30));

        // Still occupies a slot until read
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some("v"));
    }

    #[test]
    fn test_lru_eviction_respects_recency() {
        let cache: TtlLruCache<u32> = TtlLruCache::new("t", 2, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes least recently used
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c", 3);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_contains_skips_expired_and_stats() {
        let cache: TtlLruCache<u32> = TtlLruCache::new("t", 4, Duration::from_secs(60));
        cache.set("short", 1, Duration::from_millis(5));
        cache.insert("long", 2);
        std::thread::sleep(Duration::from_millis(20));

        assert!(cache.contains("long"));
        assert!(!cache.contains("short"));
        assert!(!cache.contains("missing"));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[test]
    fn test_purge_expired() {
        let cache: TtlLruCache<u32> = TtlLruCache::new("t", 8, Duration::from_secs(60));
        cache.set("x", 1, Duration::from_millis(5));
        cache.set("y", 2, Duration::from_millis(5));
        cache.insert("z", 3);
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache: TtlLruCache<u32> = TtlLruCache::new("t", 0, Duration::from_secs(60));
        cache.insert("a", 1);
        assert_eq!(cache.stats().capacity, 1);
        assert_eq!(cache.get("a"), Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let cache: Arc<TtlLruCache<usize>> = Arc::new(TtlLruCache::new("t", 1000, Duration::from_secs(60)));

        let tasks: Vec<_> = (0..16)
            .map(|t| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for i in 0..50 {
                        cache.insert(format!("{}-{}", t, i), i);
                        assert_eq!(cache.get(&format!("{}-{}", t, i)), Some(i));
                    }
                })
            })
            .collect();

        for res in futures::future::join_all(tasks).await {
            res.unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
