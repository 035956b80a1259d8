//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type - a string built from the templates in [`crate::cache::keys`]
pub type CacheKey = String;

/// Cache value type - structured data with a flat JSON text form
pub type CacheValue = serde_json::Value;

/// Read-through counters kept by the cache manager
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from the backend
    pub hits: u64,

    /// Reads that fell through to the producer (or to nothing)
    pub misses: u64,

    /// Writes that reached the backend successfully
    pub writes: u64,

    /// Writes the backend rejected or that failed to serialize
    pub write_failures: u64,

    /// Entries removed through the manager
    pub deletes: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, writes: {}, write_failures: {}, deletes: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.writes,
            self.write_failures,
            self.deletes
        )
    }
}
