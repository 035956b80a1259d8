//! # Read-Through Cache
//!
//! Caller-facing half of the crate: key templates, the age-based TTL policy,
//! configuration and the [`CacheManager`] façade that ties them to a storage
//! backend.
//!
//! ## Key Namespaces
//!
//! | Namespace      | Template                          |
//! |----------------|-----------------------------------|
//! | `page_content` | `page_content_{id}_full`          |
//! |                | `page_content_{id}_slice_{n}`     |
//! | `page_block`   | `page_block_{id}`                 |
//! | `site_data`    | `site_data_{page_id}`             |
//! | `ai_summary`   | `ai_summary_{post_id}`            |
//! | `rss_feed`     | `rss_feed_{format}`               |
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_cache::cache::{CacheConfig, CacheManager, CacheSubject};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = CacheManager::new(CacheConfig::in_memory())?;
//!
//! let key = CacheSubject::page_content_full("abc123").key();
//! let html: String = cache
//!     .get_or_set(&key, || async { "<p>rendered</p>".to_string() }, None)
//!     .await;
//!
//! println!("{} bytes", html.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod keys;
pub mod manager;
pub mod ttl;
pub mod types;
pub(crate) mod writer;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::CacheEntry;
pub use keys::{classify, encode, namespace_of, CacheSubject, Namespace};
pub use manager::CacheManager;
pub use ttl::{effective_ttl, MIN_TTL_SECS};
pub use types::{CacheKey, CacheStats, CacheValue};
