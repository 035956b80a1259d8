//! Remote key-value backend, plain JSON payloads

use crate::cache::config::CacheConfig;
use crate::cache::types::CacheValue;
use crate::connection::RemoteStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RemoteBackend {
    store: Arc<dyn RemoteStore>,
    config: CacheConfig,
}

impl RemoteBackend {
    pub fn new(store: Arc<dyn RemoteStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            config: config.clone(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let text = match self.store.get(key).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("Remote cache miss: {}", key);
                return None;
            }
            Err(e) => {
                warn!("Remote cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&text) {
            Ok(value) => {
                debug!("Remote cache hit: {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Remote cache entry {} is not valid JSON: {}", key, e);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &CacheValue, ttl_secs: Option<u64>) -> bool {
        let text = match serde_json::to_string(value) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize value for {}: {}", key, e);
                return false;
            }
        };

        let ttl = self
            .config
            .ttl_with_jitter(ttl_secs.unwrap_or(self.config.base_ttl_secs));

        match self.store.set_ex(key, &text, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Remote cache write failed for {}: {}", key, e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> u64 {
        self.store.del(key).await.unwrap_or_else(|e| {
            warn!("Remote cache delete failed for {}: {}", key, e);
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStore;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn backend(store: &Arc<MockStore>) -> RemoteBackend {
        let config = CacheConfig::builder().base_ttl_secs(600).build();
        RemoteBackend::new(store.clone(), &config)
    }

    #[tokio::test]
    async fn test_round_trip_with_ttl() {
        let store = Arc::new(MockStore::default());
        let backend = backend(&store);

        assert!(backend.set("page_block_b1", &json!({"text": "hi"}), None).await);
        assert_eq!(store.ttl("page_block_b1"), Some(600));
        assert_eq!(store.raw("page_block_b1").unwrap(), r#"{"text":"hi"}"#);
        assert_eq!(backend.get("page_block_b1").await, Some(json!({"text": "hi"})));

        assert!(backend.set("page_block_b1", &json!(1), Some(42)).await);
        assert_eq!(store.ttl("page_block_b1"), Some(42));
    }

    #[tokio::test]
    async fn test_transport_errors_degrade() {
        let store = Arc::new(MockStore::default());
        let backend = backend(&store);
        store.put_raw("k", "1");

        store.fail_reads.store(true, Ordering::SeqCst);
        store.fail_writes.store(true, Ordering::SeqCst);

        assert_eq!(backend.get("k").await, None);
        assert!(!backend.set("k", &json!(2), None).await);
        assert_eq!(backend.delete("k").await, 0);
    }

    #[tokio::test]
    async fn test_invalid_json_is_a_miss() {
        let store = Arc::new(MockStore::default());
        let backend = backend(&store);
        store.put_raw("k", "{oops");

        assert_eq!(backend.get("k").await, None);
    }

    #[tokio::test]
    async fn test_delete_counts() {
        let store = Arc::new(MockStore::default());
        let backend = backend(&store);
        backend.set("k", &json!(1), None).await;

        assert_eq!(backend.delete("k").await, 1);
        assert_eq!(backend.delete("k").await, 0);
    }
}
