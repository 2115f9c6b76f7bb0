//! Duplicate stage: ask upstream whether a URL is already a data source.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::classifier::DuplicateChecker;
use crate::lifecycle::LifecycleManager;
use crate::store::StoreError;
use crate::task::{TaskId, TaskType};
use crate::urls::{ArtifactStore, UrlId, UrlRecord};

use super::harness::StageProcessor;
use super::types::StageError;

pub struct DuplicateStage {
    artifacts: Arc<dyn ArtifactStore>,
    lifecycle: Arc<LifecycleManager>,
    checker: Arc<dyn DuplicateChecker>,
}

impl DuplicateStage {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        lifecycle: Arc<LifecycleManager>,
        checker: Arc<dyn DuplicateChecker>,
    ) -> Self {
        Self {
            artifacts,
            lifecycle,
            checker,
        }
    }
}

#[async_trait]
impl StageProcessor for DuplicateStage {
    type Item = UrlRecord;
    type Output = bool;

    fn task_type(&self) -> TaskType {
        TaskType::Duplicate
    }

    fn fetch_eligible(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError> {
        self.artifacts.urls_unchecked_for_duplicates(limit)
    }

    fn url_id(item: &UrlRecord) -> UrlId {
        item.id
    }

    async fn process(&self, url: &UrlRecord) -> Result<bool, StageError> {
        Ok(self.checker.is_duplicate(&url.url).await?)
    }

    fn commit(&self, _task_id: TaskId, url: UrlRecord, is_duplicate: bool) -> Result<(), StageError> {
        self.artifacts.mark_duplicate_checked(url.id, is_duplicate)?;
        if is_duplicate {
            self.lifecycle.mark_duplicate(url.id)?;
            info!(url_id = url.id, "URL already registered upstream");
        }
        Ok(())
    }
}
