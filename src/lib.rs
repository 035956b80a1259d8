//! # Ouroboros Cache (ouroboros-cache)
//!
//! A read-through cache for rendered document content: pages, page blocks,
//! site data, AI summaries and syndication feeds.
//!
//! ## Features
//!
//! - Read-through `get_or_set` with fire-and-forget background writes
//! - Four backends chosen from configuration: memory, local files, remote
//!   key-value store and compressed remote key-value store
//! - Age-based TTL policy: stale content is cached longer
//! - zlib compression with chunking for multi-megabyte payloads
//! - Bounded lease pool with FIFO waiters and idle reclamation
//! - Cache failures never reach the caller; they become misses
//!
//! ## Read-Through
//!
//! ```no_run
//! use ouroboros_cache::{CacheConfig, CacheManager, CacheSubject};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = CacheManager::new(CacheConfig::shared("redis://localhost:6379"))?;
//!
//!     let key = CacheSubject::site_data("p1").key();
//!     let title: String = cache
//!         .get_or_set(&key, || async { "My Site".to_string() }, None)
//!         .await;
//!
//!     println!("Site title: {}", title);
//!     Ok(())
//! }
//! ```
//!
//! ## Age-Based TTL
//!
//! ```no_run
//! use chrono::{Duration, Utc};
//! use ouroboros_cache::{CacheConfig, CacheManager, CacheSubject};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CacheConfig::builder().base_ttl_secs(600).build();
//!     let cache = CacheManager::new(config)?;
//!
//!     // Last edited ten days ago: 600s * 15
//!     let ttl = cache.ttl_for(Some(Utc::now() - Duration::days(10)));
//!     assert_eq!(ttl, 9000);
//!
//!     let key = CacheSubject::page_content_full("abc123").key();
//!     let _html: String = cache
//!         .get_or_set(&key, || async { "<article/>".to_string() }, Some(ttl))
//!         .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! [`CacheConfig::from_env`] reads `.env` and the process environment:
//!
//! ```no_run
//! use ouroboros_cache::CacheManager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = CacheManager::from_env()?;
//!     println!("Using the {} backend", cache.backend_kind());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod compression;
pub mod connection;
pub mod error;
pub mod pool;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use backend::{BackendKind, CacheBackend};
pub use cache::{
    classify, effective_ttl, encode, CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey,
    CacheManager, CacheStats, CacheSubject, CacheValue, Namespace,
};
pub use connection::{RedisStore, RemoteStore};
pub use error::{CacheError, Result};
pub use pool::{ConnectionPool, PoolConfig, PoolLease, PoolStats};
