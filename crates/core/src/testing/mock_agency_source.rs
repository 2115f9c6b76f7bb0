//! Mock agency source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::classifier::ClassifierError;
use crate::sync::{Agency, AgencySource};

/// Mock implementation of [`AgencySource`].
///
/// Serves configured pages in order (page 1 is the first) and an empty
/// page past the end. The `updated_since` filter is recorded, not applied.
#[derive(Debug, Clone, Default)]
pub struct MockAgencySource {
    pages: Arc<RwLock<Vec<Vec<Agency>>>>,
    failures: Arc<RwLock<HashMap<u32, ClassifierError>>>,
    calls: Arc<RwLock<Vec<(u32, Option<DateTime<Utc>>)>>>,
}

impl MockAgencySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_pages(&self, pages: Vec<Vec<Agency>>) {
        *self.pages.write().await = pages;
    }

    /// Fail the next request for `page`.
    pub async fn fail_page(&self, page: u32, error: ClassifierError) {
        self.failures.write().await.insert(page, error);
    }

    pub async fn recorded_calls(&self) -> Vec<(u32, Option<DateTime<Utc>>)> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl AgencySource for MockAgencySource {
    async fn fetch_agencies(
        &self,
        page: u32,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Agency>, ClassifierError> {
        self.calls.write().await.push((page, updated_since));
        if let Some(error) = self.failures.write().await.remove(&page) {
            return Err(error);
        }
        let index = page.saturating_sub(1) as usize;
        Ok(self
            .pages
            .read()
            .await
            .get(index)
            .cloned()
            .unwrap_or_default())
    }
}
