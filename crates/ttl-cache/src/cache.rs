use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use regex::Regex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::types::{CacheEntry, CacheStats};

/// TTL applied by [`TtlCache::set`]
pub const DEFAULT_TTL: Duration = Duration::from_secs(300); // 5 minutes
/// Suggested interval for [`TtlCache::start_sweeper`]
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound for expiry when `now + ttl` would overflow the clock
const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// In-memory cache with per-entry expiry.
///
/// Cloning yields another handle to the same entries. Reads and writes never
/// fail; a poisoned lock is recovered rather than propagated.
pub struct TtlCache<V> {
    inner: Arc<Inner<V>>,
}

struct Inner<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> Inner<V> {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evict every entry whose expiry is strictly before `now`
    fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at >= now);
        let purged = before - entries.len();
        self.evictions.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.len())
            .field("default_ttl", &self.inner.default_ttl)
            .finish()
    }
}

impl<V> TtlCache<V> {
    /// Remove a single key. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.write().remove(key).is_some()
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut entries = self.inner.write();
        let count = entries.len();
        entries.clear();
        debug!(count, "Cache cleared");
    }

    /// Remove every key matching `pattern`; non-matching keys are untouched.
    /// Returns the number of keys removed.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let mut entries = self.inner.write();
        let before = entries.len();
        entries.retain(|key, _| !pattern.is_match(key));
        let removed = before - entries.len();
        debug!(pattern = %pattern, removed, "Invalidated cache entries");
        removed
    }

    /// Run one sweep pass, evicting every entry already past its expiry
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired(Instant::now())
    }

    /// Number of stored entries, including stale ones not yet swept
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Create an empty cache using [`DEFAULT_TTL`]
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Create an empty cache with a custom default TTL
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                default_ttl,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Store a value under the default TTL
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.inner.default_ttl);
    }

    /// Store a value that expires `ttl` from now. Any existing entry is replaced.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + MAX_TTL.min(ttl));
        let key = key.into();
        trace!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cache set");
        self.inner.write().insert(
            key,
            CacheEntry {
                data: value,
                stored_at: now,
                expires_at,
            },
        );
    }

    /// Return the value if it is still fresh; a stale entry is evicted
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.lookup(key, |entry| entry.data.clone());
        let counter = if value.is_some() {
            &self.inner.hits
        } else {
            &self.inner.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Same freshness rule as [`get`](Self::get) without cloning the value
    pub fn has(&self, key: &str) -> bool {
        self.lookup(key, |_| ()).is_some()
    }

    /// Fetch the full entry (data plus timestamps) if fresh
    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lookup(key, CacheEntry::clone)
    }

    fn lookup<R>(&self, key: &str, read: impl Fn(&CacheEntry<V>) -> R) -> Option<R> {
        let now = Instant::now();
        {
            let entries = self.inner.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_fresh_at(now) => return Some(read(entry)),
                Some(_) => {}
            }
        }

        // Stale: re-check under the write lock since a writer may have replaced it
        let mut entries = self.inner.write();
        match entries.get(key) {
            Some(entry) if entry.is_fresh_at(now) => Some(read(entry)),
            Some(_) => {
                entries.remove(key);
                self.inner.evictions.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "Evicted stale cache entry");
                None
            }
            None => None,
        }
    }

    /// Read-through helper.
    ///
    /// Returns the cached value when fresh. Otherwise runs `fetcher`, stores an
    /// `Ok` result under `ttl` and returns it; an `Err` is passed through and
    /// nothing is cached. Concurrent misses on the same key each run their own
    /// fetcher.
    pub async fn with_cache<F, Fut, E>(&self, key: &str, ttl: Duration, fetcher: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(cached) = self.get(key) {
            trace!(key = %key, "Cache hit");
            return Ok(cached);
        }

        let value = fetcher().await?;
        self.set_with_ttl(key, value.clone(), ttl);
        Ok(value)
    }

    /// Spawn a background task that evicts expired entries every `interval`.
    ///
    /// The task stops when the returned handle is stopped or dropped, or once
    /// every handle to the cache has been dropped. Must be called from within
    /// a tokio runtime.
    pub fn start_sweeper(&self, interval: Duration) -> SweepHandle {
        let weak: Weak<Inner<V>> = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let purged = inner.purge_expired(Instant::now());
                if purged > 0 {
                    debug!(purged, "Swept expired cache entries");
                }
            }

            debug!("Cache sweeper stopped");
        });

        SweepHandle { task }
    }
}

/// Handle to a running sweeper; aborts the task when stopped or dropped
#[derive(Debug)]
pub struct SweepHandle {
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_get_before_and_after_ttl() {
        let cache = TtlCache::new();
        cache.set_with_ttl("pets?species=cat", vec!["catA"], Duration::from_millis(5000));

        assert_eq!(cache.get("pets?species=cat"), Some(vec!["catA"]));

        tokio::time::advance(Duration::from_millis(5001)).await;
        assert_eq!(cache.get("pets?species=cat"), None);
        // Stale entry was evicted on read
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_visible_at_exact_expiry() {
        let cache = TtlCache::new();
        cache.set_with_ttl("k", 1, Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.has("k"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!cache.has("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_uses_default_ttl() {
        let cache = TtlCache::with_default_ttl(Duration::from_secs(10));
        cache.set("k", "v");

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("k"), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_is_last_write_wins() {
        let cache = TtlCache::new();
        cache.set_with_ttl("k", "old", Duration::from_secs(1));
        cache.set_with_ttl("k", "new", Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k"), Some("new"));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = TtlCache::new();
        cache.set("a", 1);
        cache.set("b", 2);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_pattern_only_removes_matches() {
        let cache = TtlCache::new();
        cache.set("pets", 1);
        cache.set("pets?species=cat", 2);
        cache.set("pets/42", 3);
        cache.set("favorites", 4);
        cache.set("user:7:petstore", 5);

        let pattern = Regex::new(r"^pets(\?|$)").unwrap();
        assert_eq!(cache.invalidate_pattern(&pattern), 2);

        assert_eq!(cache.get("pets"), None);
        assert_eq!(cache.get("pets?species=cat"), None);
        assert_eq!(cache.get("pets/42"), Some(3));
        assert_eq!(cache.get("favorites"), Some(4));
        assert_eq!(cache.get("user:7:petstore"), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = TtlCache::new();
        cache.set_with_ttl("short", 1, Duration::from_secs(1));
        cache.set_with_ttl("long", 2, Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_unread_keys() {
        let cache = TtlCache::new();
        let _sweeper = cache.start_sweeper(Duration::from_secs(10));
        cache.set_with_ttl("never-read", 1, Duration::from_secs(1));
        cache.set_with_ttl("still-fresh", 2, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(cache.len(), 1);
        assert!(cache.has("still-fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_sweeper_no_longer_evicts() {
        let cache = TtlCache::new();
        let sweeper = cache.start_sweeper(Duration::from_secs(10));
        sweeper.stop();

        cache.set_with_ttl("k", 1, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(cache.len(), 1);
        assert!(sweeper.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_ends_when_cache_dropped() {
        let cache: TtlCache<u32> = TtlCache::new();
        let sweeper = cache.start_sweeper(Duration::from_secs(1));
        drop(cache);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(sweeper.is_finished());
    }

    #[tokio::test]
    async fn test_with_cache_fetches_once_while_fresh() {
        let cache = TtlCache::new();
        let calls = AtomicUsize::new(0);
        let calls = &calls;

        for _ in 0..3 {
            let value: Result<u32, ()> = cache
                .with_cache("pets/1", Duration::from_secs(60), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_with_cache_does_not_store_errors() {
        let cache: TtlCache<u32> = TtlCache::new();

        let result = cache
            .with_cache("pets/1", Duration::from_secs(60), || async {
                Err::<u32, _>("boom")
            })
            .await;
        assert_eq!(result, Err("boom"));
        assert!(!cache.has("pets/1"));

        let result: Result<u32, &str> = cache
            .with_cache("pets/1", Duration::from_secs(60), || async { Ok(3) })
            .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_cache_refetches_after_expiry() {
        let cache = TtlCache::new();
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let fetch = move || async move {
            Ok::<_, ()>(calls.fetch_add(1, Ordering::SeqCst))
        };

        assert_eq!(cache.with_cache("k", Duration::from_secs(5), fetch).await, Ok(0));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.with_cache("k", Duration::from_secs(5), fetch).await, Ok(1));
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = TtlCache::new();
        let other = cache.clone();
        cache.set("k", "v");
        assert_eq!(other.get("k"), Some("v"));
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let cache = TtlCache::new();
        cache.set_with_ttl("forever", 1, Duration::MAX);
        assert_eq!(cache.get("forever"), Some(1));
    }
}
