use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::fetch::{parse_html, PageFetcher};
use crate::metrics::ROOT_CACHE_LOOKUPS;
use crate::store::StoreError;
use crate::urls::root_url;

use super::{RootCacheEntry, RootCacheStore};

/// Memoises root page titles.
///
/// Concurrent misses for the same root may both fetch; the store upsert
/// keeps the last write. A failed fetch returns an empty title and leaves
/// the cache untouched so a later call can retry.
pub struct RootUrlCache {
    store: Arc<dyn RootCacheStore>,
    fetcher: Arc<dyn PageFetcher>,
    max_age: Option<Duration>,
    memory: RwLock<HashMap<String, RootCacheEntry>>,
}

impl RootUrlCache {
    pub fn new(store: Arc<dyn RootCacheStore>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            store,
            fetcher,
            max_age: None,
            memory: RwLock::new(HashMap::new()),
        }
    }

    /// Entries older than `max_age` are refetched.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Load every stored entry into memory. Returns the number loaded.
    pub async fn warm(&self) -> Result<usize, StoreError> {
        let entries = self.store.load_root_cache()?;
        let count = entries.len();
        let mut memory = self.memory.write().await;
        for entry in entries {
            memory.insert(entry.root_url.clone(), entry);
        }
        Ok(count)
    }

    /// Title of the root page of `url`, or an empty string if it could not
    /// be retrieved.
    pub async fn get_title(&self, url: &str) -> Result<String, StoreError> {
        let Some(root) = root_url(url) else {
            warn!(url, "Cannot derive root URL");
            return Ok(String::new());
        };

        if let Some(entry) = self.memory.read().await.get(&root) {
            if self.is_fresh(entry) {
                ROOT_CACHE_LOOKUPS.with_label_values(&["memory_hit"]).inc();
                return Ok(entry.page_title.clone());
            }
        }

        if let Some(entry) = self.store.get_root_cache(&root)? {
            if self.is_fresh(&entry) {
                ROOT_CACHE_LOOKUPS.with_label_values(&["store_hit"]).inc();
                let title = entry.page_title.clone();
                self.memory.write().await.insert(root, entry);
                return Ok(title);
            }
        }

        let page = match self.fetcher.fetch(&root).await {
            Ok(page) => page,
            Err(e) => {
                ROOT_CACHE_LOOKUPS.with_label_values(&["fetch_error"]).inc();
                warn!(root = %root, error = %e, "Root page fetch failed");
                return Ok(String::new());
            }
        };

        let parsed = parse_html(&page.body);
        let title = parsed.title.unwrap_or_default();
        let entry =
            self.store
                .upsert_root_cache(&root, &title, parsed.description.as_deref())?;
        ROOT_CACHE_LOOKUPS.with_label_values(&["fetched"]).inc();
        debug!(root = %root, title = %title, "Cached root page title");

        self.memory.write().await.insert(root, entry);
        Ok(title)
    }

    fn is_fresh(&self, entry: &RootCacheEntry) -> bool {
        let Some(max_age) = self.max_age else {
            return true;
        };
        (Utc::now() - entry.updated_at)
            .to_std()
            .map(|age| age <= max_age)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::store::SqliteStore;
    use crate::testing::MockPageFetcher;

    fn cache_with(fetcher: Arc<MockPageFetcher>) -> (RootUrlCache, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        (RootUrlCache::new(store.clone(), fetcher), store)
    }

    #[tokio::test]
    async fn test_shared_root_fetched_once() {
        let fetcher = Arc::new(MockPageFetcher::new());
        fetcher
            .set_page("https://example.gov", "<title>Example County</title>")
            .await;
        let (cache, _) = cache_with(fetcher.clone());

        let first = cache.get_title("https://example.gov/police/logs").await.unwrap();
        let second = cache.get_title("example.gov/courts#top").await.unwrap();

        assert_eq!(first, "Example County");
        assert_eq!(second, first);
        assert_eq!(fetcher.fetched_urls().await, vec!["https://example.gov"]);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let fetcher = Arc::new(MockPageFetcher::new());
        fetcher
            .set_next_error(FetchError::Connection("reset".into()))
            .await;
        fetcher
            .set_page("https://flaky.gov", "<title>Flaky</title>")
            .await;
        let (cache, store) = cache_with(fetcher.clone());

        assert_eq!(cache.get_title("https://flaky.gov/a").await.unwrap(), "");
        assert!(store.get_root_cache("https://flaky.gov").unwrap().is_none());

        assert_eq!(cache.get_title("https://flaky.gov/a").await.unwrap(), "Flaky");
        assert_eq!(fetcher.fetched_urls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_store_entries_survive_restart() {
        let fetcher = Arc::new(MockPageFetcher::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .upsert_root_cache("https://known.gov", "Known", None)
            .unwrap();

        let cache = RootUrlCache::new(store, fetcher.clone());
        assert_eq!(cache.warm().await.unwrap(), 1);
        assert_eq!(cache.get_title("https://known.gov/x").await.unwrap(), "Known");
        assert!(fetcher.fetched_urls().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_entry_is_refetched() {
        let fetcher = Arc::new(MockPageFetcher::new());
        fetcher.set_page("https://old.gov", "<title>New</title>").await;
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store.upsert_root_cache("https://old.gov", "Old", None).unwrap();

        let cache = RootUrlCache::new(store, fetcher.clone()).with_max_age(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get_title("https://old.gov/x").await.unwrap(), "New");
    }

    #[tokio::test]
    async fn test_unparseable_url_returns_sentinel() {
        let fetcher = Arc::new(MockPageFetcher::new());
        let (cache, _) = cache_with(fetcher.clone());
        assert_eq!(cache.get_title("").await.unwrap(), "");
        assert!(fetcher.fetched_urls().await.is_empty());
    }
}
