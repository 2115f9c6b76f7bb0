//! HTML stage: download pages that probed 2xx and keep their text fields.

use std::sync::Arc;

use async_trait::async_trait;

use crate::fetch::{parse_html, PageFetcher};
use crate::root_cache::RootUrlCache;
use crate::store::StoreError;
use crate::task::{TaskId, TaskType};
use crate::urls::{ArtifactStore, HtmlContent, UrlId, UrlRecord};

use super::harness::StageProcessor;
use super::types::StageError;

pub struct HtmlStage {
    artifacts: Arc<dyn ArtifactStore>,
    fetcher: Arc<dyn PageFetcher>,
    root_cache: Arc<RootUrlCache>,
}

impl HtmlStage {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        fetcher: Arc<dyn PageFetcher>,
        root_cache: Arc<RootUrlCache>,
    ) -> Self {
        Self {
            artifacts,
            fetcher,
            root_cache,
        }
    }
}

#[async_trait]
impl StageProcessor for HtmlStage {
    type Item = UrlRecord;
    type Output = HtmlContent;

    fn task_type(&self) -> TaskType {
        TaskType::Html
    }

    fn fetch_eligible(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError> {
        self.artifacts.urls_pending_html(limit)
    }

    fn url_id(item: &UrlRecord) -> UrlId {
        item.id
    }

    async fn process(&self, url: &UrlRecord) -> Result<HtmlContent, StageError> {
        let page = self.fetcher.fetch(&url.url).await?;
        let parsed = parse_html(&page.body);
        let root_title = self.root_cache.get_title(&url.url).await?;

        Ok(HtmlContent {
            html: page.body,
            title: parsed.title,
            description: parsed.description,
            h1: parsed.h1,
            root_page_title: Some(root_title).filter(|t| !t.is_empty()),
        })
    }

    fn commit(&self, _task_id: TaskId, url: UrlRecord, html: HtmlContent) -> Result<(), StageError> {
        self.artifacts.store_html(url.id, &html)?;
        Ok(())
    }
}
