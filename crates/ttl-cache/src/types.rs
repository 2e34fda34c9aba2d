//! Cache types

use std::time::Duration;

use tokio::time::Instant;

/// A cached value with its storage and expiry timestamps
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Entries are visible while `now <= expires_at`
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now <= self.expires_at
    }

    /// Time left before the entry goes stale (zero once expired)
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of reads served from cache, 0.0 when nothing was read
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
