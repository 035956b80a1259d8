//! Cache entry with TTL metadata

use crate::cache::types::{CacheKey, CacheValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A stored value plus the lifetime it was written with
///
/// The memory and file backends keep this metadata but do not enforce it;
/// callers that care about staleness check [`CacheEntry::is_expired`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key
    pub key: CacheKey,

    /// The cached value
    pub value: CacheValue,

    /// TTL requested at write time, in seconds
    pub ttl_secs: u64,

    /// When the entry was written
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new entry written now
    pub fn new(key: CacheKey, value: CacheValue, ttl_secs: u64) -> Self {
        Self {
            key,
            value,
            ttl_secs,
            created_at: Utc::now(),
        }
    }

    /// When the entry becomes stale
    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        self.created_at
            .checked_add_signed(chrono::Duration::try_seconds(ttl).unwrap_or(chrono::Duration::MAX))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }

    /// Get time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        (self.expires_at() - Utc::now()).to_std().ok()
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Approximate size of this entry in bytes
    pub fn calculate_size(&self) -> usize {
        self.key.len() + self.value.to_string().len() + std::mem::size_of::<Self>()
    }
}
