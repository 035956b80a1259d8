//! Process-local memory backend
//!
//! Entries carry their TTL but are never expired here; callers that need
//! freshness check [`CacheEntry::is_expired`] via [`MemoryBackend::entry`].

use crate::cache::config::CacheConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::types::{CacheKey, CacheValue};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    default_ttl_secs: u64,
}

impl MemoryBackend {
    /// Empty store; entries written without a TTL record `base_ttl_secs`
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            default_ttl_secs: config.base_ttl_secs,
        }
    }

    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let entries = self.entries.read().await;
        let value = entries.get(key).map(|entry| entry.value.clone());
        debug!("Memory cache {}: {}", if value.is_some() { "hit" } else { "miss" }, key);
        value
    }

    /// Full entry including write time and TTL
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: &CacheValue, ttl_secs: Option<u64>) -> bool {
        let entry = CacheEntry::new(
            key.to_string(),
            value.clone(),
            ttl_secs.unwrap_or(self.default_ttl_secs),
        );
        self.entries.write().await.insert(key.to_string(), entry);
        debug!("Memory cache set: {}", key);
        true
    }

    pub async fn delete(&self, key: &str) -> u64 {
        u64::from(self.entries.write().await.remove(key).is_some())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_basic_set_and_get() {
        let backend = MemoryBackend::new(&CacheConfig::default());

        assert!(backend.set("key1", &json!({"a": 1}), None).await);
        assert_eq!(backend.get("key1").await, Some(json!({"a": 1})));
        assert_eq!(backend.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_set_replaces_wholesale() {
        let backend = MemoryBackend::new(&CacheConfig::default());
        backend.set("key", &json!({"a": 1, "b": 2}), None).await;
        backend.set("key", &json!({"c": 3}), Some(60)).await;

        assert_eq!(backend.get("key").await, Some(json!({"c": 3})));
        assert_eq!(backend.entry("key").await.unwrap().ttl_secs, 60);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MemoryBackend::new(&CacheConfig::default());
        backend.set("key", &json!(1), None).await;

        assert_eq!(backend.delete("key").await, 1);
        assert_eq!(backend.delete("key").await, 0);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_ttl_is_not_enforced() {
        let backend = MemoryBackend::new(&CacheConfig::default());
        backend.set("key", &json!("stale"), Some(1)).await;

        let mut entries = backend.entries.write().await;
        let entry = entries.get_mut("key").unwrap();
        entry.created_at = entry.created_at - chrono::Duration::seconds(10);
        drop(entries);

        assert!(backend.entry("key").await.unwrap().is_expired());
        assert_eq!(backend.get("key").await, Some(json!("stale")));
    }

    #[tokio::test]
    async fn test_default_ttl_from_config() {
        let config = CacheConfig::builder().base_ttl_secs(60).build();
        let backend = MemoryBackend::new(&config);
        backend.set("key", &json!(1), None).await;

        assert_eq!(backend.entry("key").await.unwrap().ttl_secs, 60);
    }

    #[tokio::test]
    async fn test_clear() {
        let backend = MemoryBackend::new(&CacheConfig::default());
        backend.set("a", &json!(1), None).await;
        backend.set("b", &json!(2), None).await;
        backend.clear().await;
        assert_eq!(backend.len().await, 0);
    }
}
