//! Misc metadata stage: collector metadata to canonical descriptive fields.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::annotation::{
    AnnotationKind, AnnotationStore, AnnotationValue, MiscMetadata, NewAnnotation,
};
use crate::lifecycle::LifecycleManager;
use crate::store::StoreError;
use crate::subtask::{MiscMetadataProcessor, SubtaskProcessor};
use crate::task::{TaskId, TaskType};
use crate::urls::{ArtifactStore, UrlId, UrlRecord};

use super::harness::StageProcessor;
use super::types::StageError;

/// Runs the processor chosen by the URL's collector tag, then fills name
/// and description gaps from the page's title and meta description.
///
/// The result is stored as an automated annotation. Name and description
/// are copied onto the URL only where it has none yet.
pub struct MiscMetadataStage {
    annotations: Arc<dyn AnnotationStore>,
    artifacts: Arc<dyn ArtifactStore>,
    lifecycle: Arc<LifecycleManager>,
}

impl MiscMetadataStage {
    pub fn new(
        annotations: Arc<dyn AnnotationStore>,
        artifacts: Arc<dyn ArtifactStore>,
        lifecycle: Arc<LifecycleManager>,
    ) -> Self {
        Self {
            annotations,
            artifacts,
            lifecycle,
        }
    }
}

#[async_trait]
impl StageProcessor for MiscMetadataStage {
    type Item = UrlRecord;
    type Output = MiscMetadata;

    fn task_type(&self) -> TaskType {
        TaskType::MiscMetadata
    }

    fn fetch_eligible(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError> {
        self.annotations
            .pending_urls_missing_auto(AnnotationKind::MiscMetadata, limit)
    }

    fn url_id(item: &UrlRecord) -> UrlId {
        item.id
    }

    async fn process(&self, url: &UrlRecord) -> Result<MiscMetadata, StageError> {
        let processor = url
            .collector_type
            .and_then(MiscMetadataProcessor::for_collector);
        match processor {
            Some(processor) => Ok(processor.process(&url.collector_metadata)?),
            None => {
                debug!(url_id = url.id, "No metadata processor for collector");
                Ok(MiscMetadata::default())
            }
        }
    }

    fn commit(
        &self,
        _task_id: TaskId,
        url: UrlRecord,
        metadata: MiscMetadata,
    ) -> Result<(), StageError> {
        let html = self.artifacts.html_for(url.id)?;
        let metadata = match &html {
            Some(html) => {
                metadata.with_html_defaults(html.title.as_deref(), html.description.as_deref())
            }
            None => metadata,
        };

        let name = metadata.name.as_deref().filter(|_| url.name.is_none());
        let description = metadata
            .description
            .as_deref()
            .filter(|_| url.description.is_none());
        if name.is_some() || description.is_some() {
            self.lifecycle.set_details(url.id, name, description)?;
        }

        let annotation = NewAnnotation::automated(
            url.id,
            AnnotationValue::MiscMetadata(metadata.clone()),
            None,
            None,
        );
        self.lifecycle.record_annotation(&annotation)?;
        Ok(())
    }
}
