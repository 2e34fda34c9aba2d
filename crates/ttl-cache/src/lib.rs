//! In-memory TTL cache
//!
//! Key/value store where every entry carries its own expiry. Expired entries
//! read as absent and are evicted lazily on access or by a background sweep.
//! Used to deduplicate repeated identical API reads within a short window.
//!
//! Expiry is measured on the tokio clock, so tests can drive it with
//! `tokio::time::pause` / `advance`.

mod cache;
mod key;
mod types;

pub use cache::{SweepHandle, TtlCache, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};
pub use key::cache_key;
pub use types::{CacheEntry, CacheStats};
