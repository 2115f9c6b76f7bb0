//! Submit stage: register validated URLs as data sources upstream.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::annotation::{AnnotationKind, AnnotationStore, AnnotationValue};
use crate::classifier::{DataSourceRegistrar, DataSourceSubmission};
use crate::lifecycle::{LifecycleError, LifecycleManager};
use crate::store::StoreError;
use crate::task::{TaskId, TaskType};
use crate::urls::{UrlFilter, UrlId, UrlRecord, UrlStatus, UrlStore};

use super::harness::StageProcessor;
use super::types::StageError;

pub struct SubmitStage {
    urls: Arc<dyn UrlStore>,
    annotations: Arc<dyn AnnotationStore>,
    lifecycle: Arc<LifecycleManager>,
    registrar: Arc<dyn DataSourceRegistrar>,
}

impl SubmitStage {
    pub fn new(
        urls: Arc<dyn UrlStore>,
        annotations: Arc<dyn AnnotationStore>,
        lifecycle: Arc<LifecycleManager>,
        registrar: Arc<dyn DataSourceRegistrar>,
    ) -> Self {
        Self {
            urls,
            annotations,
            lifecycle,
            registrar,
        }
    }

    /// Assemble the upstream payload from the URL and its effective
    /// annotations. None if the URL has no name.
    fn submission_for(&self, url: UrlRecord) -> Result<Option<DataSourceSubmission>, StoreError> {
        let Some(name) = url.name.filter(|n| !n.trim().is_empty()) else {
            return Ok(None);
        };
        let mut submission = DataSourceSubmission {
            url_id: url.id,
            url: url.url,
            name,
            description: url.description,
            record_type: None,
            agency_id: None,
            record_formats: Vec::new(),
            data_portal_type: None,
            supplying_entity: None,
        };

        for kind in [
            AnnotationKind::RecordType,
            AnnotationKind::Agency,
            AnnotationKind::MiscMetadata,
        ] {
            let Some(annotation) = self.annotations.effective_annotation(url.id, kind)? else {
                continue;
            };
            match annotation.value {
                AnnotationValue::RecordType { record_type } => {
                    submission.record_type = Some(record_type)
                }
                AnnotationValue::Agency { agency_id, .. } => submission.agency_id = agency_id,
                AnnotationValue::MiscMetadata(metadata) => {
                    submission.record_formats = metadata.record_formats;
                    submission.data_portal_type = metadata.data_portal_type;
                    submission.supplying_entity = metadata.supplying_entity;
                }
                AnnotationValue::Relevant { .. } => {}
            }
        }
        Ok(Some(submission))
    }
}

#[async_trait]
impl StageProcessor for SubmitStage {
    type Item = DataSourceSubmission;
    type Output = i64;

    fn task_type(&self) -> TaskType {
        TaskType::Submit
    }

    fn fetch_eligible(&self, limit: usize) -> Result<Vec<DataSourceSubmission>, StoreError> {
        // Unnamed URLs cannot be submitted; put them back in the queue first.
        self.lifecycle
            .enforce_validated_names()
            .map_err(|e| match e {
                LifecycleError::Store(e) => e,
                other => StoreError::Database(other.to_string()),
            })?;

        let filter = UrlFilter::new()
            .with_status(UrlStatus::Validated)
            .with_limit(limit as i64);
        let mut submissions = Vec::new();
        for url in self.urls.list_urls(&filter)? {
            let url_id = url.id;
            match self.submission_for(url)? {
                Some(submission) => submissions.push(submission),
                None => warn!(url_id, "Validated URL without a name skipped"),
            }
        }
        Ok(submissions)
    }

    fn url_id(item: &DataSourceSubmission) -> UrlId {
        item.url_id
    }

    async fn process(&self, submission: &DataSourceSubmission) -> Result<i64, StageError> {
        Ok(self.registrar.register(submission).await?)
    }

    fn commit(
        &self,
        _task_id: TaskId,
        submission: DataSourceSubmission,
        data_source_id: i64,
    ) -> Result<(), StageError> {
        self.lifecycle
            .mark_submitted(submission.url_id, data_source_id)?;
        info!(
            url_id = submission.url_id,
            data_source_id, "Registered data source"
        );
        Ok(())
    }
}
