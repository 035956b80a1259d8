//! Remote key-value backend with payload compression
//!
//! Values above the codec threshold are compressed and stored as
//! `ZLIB:` + base64. Smaller values, and values that do not shrink enough, are
//! stored as plain JSON text. JSON never starts with `Z`, so the prefix is
//! unambiguous.
//!
//! Every command runs under a [`PoolLease`]; the lease is returned before any
//! decoding. Codec work on large payloads runs on the blocking pool. Entries
//! that fail to decode are deleted on read so a corrupted write heals itself
//! on the next miss.

use crate::cache::config::CacheConfig;
use crate::cache::keys::{namespace_of, Namespace};
use crate::cache::types::CacheValue;
use crate::compression;
use crate::connection::RemoteStore;
use crate::error::{CacheError, Result};
use crate::pool::{ConnectionPool, PoolLease};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tracing::{debug, warn};

/// Marks a compressed payload; the name carries no meaning beyond that
pub const COMPRESSED_PREFIX: &str = "ZLIB:";

/// Base TTL multiplier per key namespace
pub fn namespace_ttl_multiplier(namespace: Option<Namespace>) -> u64 {
    match namespace {
        Some(Namespace::PageContent) => 1,
        Some(Namespace::PageBlock) => 2,
        Some(Namespace::SiteData) => 1,
        Some(Namespace::AiSummary) => 24,
        Some(Namespace::RssFeed) => 1,
        None => 1,
    }
}

pub struct CompressedRemoteBackend {
    pool: ConnectionPool,
    config: CacheConfig,
}

impl CompressedRemoteBackend {
    /// Wrap `store` in a lease pool
    ///
    /// When called inside a tokio runtime the pool's idle sweep is started.
    pub fn new(store: Arc<dyn RemoteStore>, config: &CacheConfig) -> Self {
        let pool = ConnectionPool::new(store, config.pool.clone());
        if tokio::runtime::Handle::try_current().is_ok() {
            pool.start_reaper();
        } else {
            warn!("No tokio runtime, pool sweep not started");
        }

        Self {
            pool,
            config: config.clone(),
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// TTL used for `key`: the override as given, or the namespace-scaled base
    pub fn ttl_for(&self, key: &str, ttl_override: Option<u64>) -> u64 {
        ttl_override.unwrap_or_else(|| {
            self.config
                .base_ttl_secs
                .saturating_mul(namespace_ttl_multiplier(namespace_of(key)))
        })
    }

    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let lease = self.lease(key).await?;
        let fetched = lease.store().get(key).await;
        lease.release();

        let text = match fetched {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("Compressed cache miss: {}", key);
                return None;
            }
            Err(e) => {
                self.transport_failed("read", key, &e);
                return None;
            }
        };

        let stored_len = text.len();
        match decode_off_runtime(text).await {
            Ok(value) => {
                debug!("Compressed cache hit: {} ({} bytes stored)", key, stored_len);
                Some(value)
            }
            Err(e) => {
                warn!("Cache entry {} is unreadable, deleting it: {}", key, e);
                self.delete(key).await;
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &CacheValue, ttl_secs: Option<u64>) -> bool {
        let payload = match encode_off_runtime(value).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode value for {}: {}", key, e);
                return false;
            }
        };
        let ttl = self.config.ttl_with_jitter(self.ttl_for(key, ttl_secs));

        let Some(lease) = self.lease(key).await else {
            return false;
        };
        let result = lease.store().set_ex(key, &payload, ttl).await;
        lease.release();

        match result {
            Ok(()) => true,
            Err(e) => {
                self.transport_failed("write", key, &e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> u64 {
        let Some(lease) = self.lease(key).await else {
            return 0;
        };
        let result = lease.store().del(key).await;
        lease.release();

        result.unwrap_or_else(|e| {
            self.transport_failed("delete", key, &e);
            0
        })
    }

    async fn lease(&self, key: &str) -> Option<PoolLease> {
        match self.pool.acquire().await {
            Ok(lease) => Some(lease),
            Err(e) => {
                warn!("No pool lease for {}: {}", key, e);
                None
            }
        }
    }

    fn transport_failed(&self, op: &str, key: &str, e: &CacheError) {
        warn!("Compressed cache {} failed for {}: {}", op, key, e);
        if e.is_disconnect() {
            self.pool.handle_disconnect();
        }
    }
}

/// Serialize a value into its stored text form
pub fn encode_payload(value: &CacheValue) -> Result<String> {
    let text = serde_json::to_string(value)?;
    if text.len() <= compression::COMPRESSION_THRESHOLD {
        return Ok(text);
    }
    Ok(compress_text(text))
}

/// Parse a stored text form back into a value
pub fn decode_payload(text: &str) -> Result<CacheValue> {
    match text.strip_prefix(COMPRESSED_PREFIX) {
        Some(encoded) => {
            let compressed = STANDARD
                .decode(encoded)
                .map_err(|e| CacheError::CompressionError(format!("invalid base64: {}", e)))?;
            let bytes = compression::try_decompress(&compressed)?;
            Ok(serde_json::from_slice(&bytes)?)
        }
        None => Ok(serde_json::from_str(text)?),
    }
}

fn compress_text(text: String) -> String {
    let compressed = compression::compress(text.as_bytes());
    if !compression::worth_compressing(text.len(), compressed.len()) {
        debug!(
            "Compression saved only {:.1}%, storing {} bytes raw",
            compression::compression_ratio(text.len(), compressed.len()),
            text.len()
        );
        return text;
    }

    format!("{}{}", COMPRESSED_PREFIX, STANDARD.encode(compressed))
}

// Codec work above the threshold runs on the blocking pool.
async fn encode_off_runtime(value: &CacheValue) -> Result<String> {
    let text = serde_json::to_string(value)?;
    if text.len() <= compression::COMPRESSION_THRESHOLD {
        return Ok(text);
    }

    tokio::task::spawn_blocking(move || compress_text(text))
        .await
        .map_err(|e| CacheError::Other(format!("compression task failed: {}", e)))
}

async fn decode_off_runtime(text: String) -> Result<CacheValue> {
    if !text.starts_with(COMPRESSED_PREFIX) && text.len() <= compression::COMPRESSION_THRESHOLD {
        return decode_payload(&text);
    }

    tokio::task::spawn_blocking(move || decode_payload(&text))
        .await
        .map_err(|e| CacheError::Other(format!("decompression task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::testing::MockStore;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn config() -> CacheConfig {
        CacheConfig::builder()
            .remote_store_url("redis://mock")
            .compression_enabled(true)
            .base_ttl_secs(600)
            .pool(PoolConfig {
                max_connections: 2,
                acquire_timeout: Duration::from_millis(50),
                ..Default::default()
            })
            .build()
    }

    fn document(len: usize) -> String {
        let mut out = String::with_capacity(len + 32);
        let mut i = 0usize;
        while out.len() < len {
            out.push_str(&format!("<p class=\"block-{}\">paragraph {} of the page</p>", i % 13, i));
            i += 1;
        }
        out.truncate(len);
        out
    }

    #[tokio::test]
    async fn test_small_value_stored_plain() {
        let store = Arc::new(MockStore::default());
        let backend = CompressedRemoteBackend::new(store.clone(), &config());
        let value = json!({ "html": document(10 * 1024) });

        assert!(backend.set("page_content_abc_full", &value, None).await);
        let raw = store.raw("page_content_abc_full").unwrap();
        assert!(!raw.starts_with(COMPRESSED_PREFIX));
        assert_eq!(backend.get("page_content_abc_full").await, Some(value));
    }

    #[tokio::test]
    async fn test_large_value_is_chunked_and_round_trips() {
        let store = Arc::new(MockStore::default());
        let backend = CompressedRemoteBackend::new(store.clone(), &config());
        let value = json!({ "html": document(2 * 1024 * 1024) });

        assert!(backend.set("page_content_abc_full", &value, None).await);

        let raw = store.raw("page_content_abc_full").unwrap();
        let encoded = raw.strip_prefix(COMPRESSED_PREFIX).expect("prefix");
        let compressed = STANDARD.decode(encoded).unwrap();
        let header = u32::from_be_bytes(compressed[..4].try_into().unwrap());
        assert!(header < 4096, "expected a chunk metadata header, got {}", header);
        assert!(raw.len() < value.to_string().len());

        assert_eq!(backend.get("page_content_abc_full").await, Some(value));
        assert_eq!(backend.pool().stats().active, 0);
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_deleted() {
        let store = Arc::new(MockStore::default());
        let backend = CompressedRemoteBackend::new(store.clone(), &config());

        store.put_raw("page_block_b1", "ZLIB:AAAAAAAA");
        assert_eq!(backend.get("page_block_b1").await, None);
        assert!(store.raw("page_block_b1").is_none());

        store.put_raw("page_block_b2", "ZLIB:%%% not base64");
        assert_eq!(backend.get("page_block_b2").await, None);
        assert!(store.raw("page_block_b2").is_none());
    }

    #[tokio::test]
    async fn test_forged_chunk_metadata_is_a_miss() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(br#"{"chunk_count":0,"original_size":18446744073709551615,"chunk_sizes":[]}"#)
            .unwrap();
        let metadata = encoder.finish().unwrap();
        let mut forged = (metadata.len() as u32).to_be_bytes().to_vec();
        forged.extend_from_slice(&metadata);

        let store = Arc::new(MockStore::default());
        let backend = CompressedRemoteBackend::new(store.clone(), &config());
        store.put_raw(
            "page_content_abc_full",
            &format!("{}{}", COMPRESSED_PREFIX, STANDARD.encode(&forged)),
        );

        assert_eq!(backend.get("page_content_abc_full").await, None);
        assert!(store.raw("page_content_abc_full").is_none());
        assert_eq!(backend.pool().stats().active, 0);
    }

    #[tokio::test]
    async fn test_large_read_and_heal_with_one_free_slot() {
        let store = Arc::new(MockStore::default());
        let backend = CompressedRemoteBackend::new(store.clone(), &config());
        let value = json!({ "html": document(1024 * 1024) });
        assert!(backend.set("page_content_big_full", &value, None).await);

        // Hold one of the two slots; reads and the corrupt-entry delete still get one.
        let _held = backend.pool().acquire().await.unwrap();
        assert_eq!(backend.get("page_content_big_full").await, Some(value));

        store.put_raw("page_content_bad_full", "ZLIB:AAAA");
        assert_eq!(backend.get("page_content_bad_full").await, None);
        assert!(store.raw("page_content_bad_full").is_none());
        assert_eq!(backend.pool().stats().active, 1);
    }

    #[tokio::test]
    async fn test_namespace_ttl() {
        let store = Arc::new(MockStore::default());
        let backend = CompressedRemoteBackend::new(store.clone(), &config());

        backend.set("ai_summary_post1", &json!("summary"), None).await;
        assert_eq!(store.ttl("ai_summary_post1"), Some(600 * 24));

        backend.set("totally_unknown_key", &json!(1), None).await;
        assert_eq!(store.ttl("totally_unknown_key"), Some(600));

        backend.set("ai_summary_post2", &json!("summary"), Some(30)).await;
        assert_eq!(store.ttl("ai_summary_post2"), Some(30));
    }

    #[tokio::test]
    async fn test_transport_errors_degrade() {
        let store = Arc::new(MockStore::default());
        let backend = CompressedRemoteBackend::new(store.clone(), &config());
        store.fail_reads.store(true, Ordering::SeqCst);
        store.fail_writes.store(true, Ordering::SeqCst);

        assert_eq!(backend.get("k").await, None);
        assert!(!backend.set("k", &json!(1), None).await);
        assert_eq!(backend.delete("k").await, 0);
        assert_eq!(backend.pool().stats().active, 0);
        assert_eq!(backend.pool().stats().disconnects, 0);
    }

    #[tokio::test]
    async fn test_disconnect_resets_pool() {
        let store = Arc::new(MockStore::default());
        let backend = CompressedRemoteBackend::new(store.clone(), &config());
        store.disconnected.store(true, Ordering::SeqCst);

        assert_eq!(backend.get("k").await, None);
        assert_eq!(backend.pool().stats().disconnects, 1);
        assert_eq!(backend.pool().stats().active, 0);
    }

    #[tokio::test]
    async fn test_pool_timeout_is_a_miss() {
        let store = Arc::new(MockStore::default());
        let backend = CompressedRemoteBackend::new(store.clone(), &config());
        let _a = backend.pool().acquire().await.unwrap();
        let _b = backend.pool().acquire().await.unwrap();

        assert_eq!(backend.get("k").await, None);
        assert!(!backend.set("k", &json!(1), None).await);
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
        assert_eq!(store.sets.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_payload_codec() {
        let small = json!({"a": 1});
        assert_eq!(encode_payload(&small).unwrap(), r#"{"a":1}"#);
        assert_eq!(decode_payload(r#"{"a":1}"#).unwrap(), small);
        assert!(decode_payload("not json").is_err());
    }
}
