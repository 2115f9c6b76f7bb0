//! Per-root page title cache.
//!
//! Several URLs on the same site share a root page. Its title is fetched
//! once, written through to storage and memoised in memory.

mod cache;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

pub use cache::RootUrlCache;

/// A cached root page lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RootCacheEntry {
    /// Scheme and host, e.g. `https://example.gov`.
    pub root_url: String,
    pub page_title: String,
    pub page_description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Durable storage for root cache entries.
pub trait RootCacheStore: Send + Sync {
    fn load_root_cache(&self) -> Result<Vec<RootCacheEntry>, StoreError>;

    fn get_root_cache(&self, root_url: &str) -> Result<Option<RootCacheEntry>, StoreError>;

    /// Insert or replace the entry keyed by `root_url`.
    fn upsert_root_cache(
        &self,
        root_url: &str,
        page_title: &str,
        page_description: Option<&str>,
    ) -> Result<RootCacheEntry, StoreError>;
}
