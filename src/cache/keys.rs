//! Cache key templates
//!
//! Keys are plain strings built from fixed per-namespace templates. They are a
//! stable wire contract: entries written by one process must be readable by
//! every other process sharing the same remote store.
//!
//! Identifiers are not escaped. An identifier that contains a template's own
//! delimiter (for example `_slice_`) produces a key that may classify into a
//! different subject. Keeping identifiers delimiter-free is up to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default feed format used by [`CacheSubject::rss_feed`]
pub const DEFAULT_FEED_FORMAT: &str = "rss2";

const PAGE_CONTENT_PREFIX: &str = "page_content_";
const PAGE_BLOCK_PREFIX: &str = "page_block_";
const SITE_DATA_PREFIX: &str = "site_data_";
const AI_SUMMARY_PREFIX: &str = "ai_summary_";
const RSS_FEED_PREFIX: &str = "rss_feed_";
const FULL_SUFFIX: &str = "_full";
const SLICE_DELIMITER: &str = "_slice_";

/// Logical category of a cached subject, encoded as the key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Rendered page content, whole or sliced
    PageContent,

    /// A single upstream block
    PageBlock,

    /// Site-wide data rooted at a page
    SiteData,

    /// Generated post summary
    AiSummary,

    /// Syndication feed
    RssFeed,
}

impl Namespace {
    /// All namespaces, in classification order
    pub const ALL: [Namespace; 5] = [
        Namespace::PageContent,
        Namespace::PageBlock,
        Namespace::SiteData,
        Namespace::AiSummary,
        Namespace::RssFeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::PageContent => "page_content",
            Namespace::PageBlock => "page_block",
            Namespace::SiteData => "site_data",
            Namespace::AiSummary => "ai_summary",
            Namespace::RssFeed => "rss_feed",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A semantic cache subject: one template plus its identifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheSubject {
    /// `page_content_{id}_full`
    PageContentFull { id: String },

    /// `page_content_{id}_slice_{n}`
    PageContentSlice { id: String, slice: u32 },

    /// `page_block_{id}`
    PageBlock { id: String },

    /// `site_data_{page_id}`
    SiteData { page_id: String },

    /// `ai_summary_{post_id}`
    AiSummary { post_id: String },

    /// `rss_feed_{format}`
    RssFeed { format: String },
}

impl CacheSubject {
    pub fn page_content_full(id: impl Into<String>) -> Self {
        CacheSubject::PageContentFull { id: id.into() }
    }

    pub fn page_content_slice(id: impl Into<String>, slice: u32) -> Self {
        CacheSubject::PageContentSlice {
            id: id.into(),
            slice,
        }
    }

    pub fn page_block(id: impl Into<String>) -> Self {
        CacheSubject::PageBlock { id: id.into() }
    }

    pub fn site_data(page_id: impl Into<String>) -> Self {
        CacheSubject::SiteData {
            page_id: page_id.into(),
        }
    }

    pub fn ai_summary(post_id: impl Into<String>) -> Self {
        CacheSubject::AiSummary {
            post_id: post_id.into(),
        }
    }

    /// Feed subject; `None` selects [`DEFAULT_FEED_FORMAT`]
    pub fn rss_feed(format: Option<&str>) -> Self {
        CacheSubject::RssFeed {
            format: format.unwrap_or(DEFAULT_FEED_FORMAT).to_string(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            CacheSubject::PageContentFull { .. } | CacheSubject::PageContentSlice { .. } => {
                Namespace::PageContent
            }
            CacheSubject::PageBlock { .. } => Namespace::PageBlock,
            CacheSubject::SiteData { .. } => Namespace::SiteData,
            CacheSubject::AiSummary { .. } => Namespace::AiSummary,
            CacheSubject::RssFeed { .. } => Namespace::RssFeed,
        }
    }

    /// Encode into the wire key
    pub fn key(&self) -> String {
        encode(self)
    }
}

impl fmt::Display for CacheSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheSubject::PageContentFull { id } => {
                write!(f, "{}{}{}", PAGE_CONTENT_PREFIX, id, FULL_SUFFIX)
            }
            CacheSubject::PageContentSlice { id, slice } => {
                write!(f, "{}{}{}{}", PAGE_CONTENT_PREFIX, id, SLICE_DELIMITER, slice)
            }
            CacheSubject::PageBlock { id } => write!(f, "{}{}", PAGE_BLOCK_PREFIX, id),
            CacheSubject::SiteData { page_id } => write!(f, "{}{}", SITE_DATA_PREFIX, page_id),
            CacheSubject::AiSummary { post_id } => write!(f, "{}{}", AI_SUMMARY_PREFIX, post_id),
            CacheSubject::RssFeed { format } => write!(f, "{}{}", RSS_FEED_PREFIX, format),
        }
    }
}

/// Encode a subject into its cache key
pub fn encode(subject: &CacheSubject) -> String {
    subject.to_string()
}

/// Classify a key back into its subject
///
/// Returns `None` for anything that does not match a known template; this is
/// a normal outcome, not an error.
pub fn classify(key: &str) -> Option<CacheSubject> {
    if let Some(rest) = key.strip_prefix(PAGE_CONTENT_PREFIX) {
        if let Some(id) = rest.strip_suffix(FULL_SUFFIX) {
            return non_empty(id).map(|id| CacheSubject::page_content_full(id));
        }
        let (id, slice) = rest.rsplit_once(SLICE_DELIMITER)?;
        let id = non_empty(id)?;
        let slice = parse_slice(slice)?;
        return Some(CacheSubject::page_content_slice(id, slice));
    }

    if let Some(id) = key.strip_prefix(PAGE_BLOCK_PREFIX) {
        return non_empty(id).map(CacheSubject::page_block);
    }
    if let Some(page_id) = key.strip_prefix(SITE_DATA_PREFIX) {
        return non_empty(page_id).map(CacheSubject::site_data);
    }
    if let Some(post_id) = key.strip_prefix(AI_SUMMARY_PREFIX) {
        return non_empty(post_id).map(CacheSubject::ai_summary);
    }
    if let Some(format) = key.strip_prefix(RSS_FEED_PREFIX) {
        return non_empty(format).map(|format| CacheSubject::rss_feed(Some(format)));
    }

    None
}

/// Namespace of a key, if it classifies
pub fn namespace_of(key: &str) -> Option<Namespace> {
    classify(key).map(|subject| subject.namespace())
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

// Only canonical decimal forms, so the key re-encodes to the same string.
fn parse_slice(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}
