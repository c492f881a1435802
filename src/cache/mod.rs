//! Two-layer resolution cache
//!
//! | Layer | Scope | Eviction | Expiry |
//! |-------|-------|----------|--------|
//! | [`MemoryCache`] | process | LRU, bounded entries | monotonic TTL |
//! | [`ResolutionStore`] | cross-process | none | wall-clock `expires_at` + sweep |
//!
//! Durable expiry uses UTC wall-clock timestamps, so processes sharing one
//! store should have reasonably synchronised clocks; skew only matters at
//! the edge of the (hours to days) TTL window.

pub mod durable;
pub mod memory;

pub use durable::{RecordKey, ResolutionStore, SqliteStore};
pub use memory::MemoryCache;

use sha2::{Digest, Sha256};

/// Composite cache key over name, version, system and ordered channels
pub fn cache_key(name: &str, version: &str, system: &str, channels: &[String]) -> String {
    let mut hasher = Sha256::new();
    for part in [name, version, system] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(channels.join(",").as_bytes());
    hex::encode(hasher.finalize())
}
