//! Record type stage.

use std::sync::Arc;

use async_trait::async_trait;

use crate::annotation::{AnnotationKind, AnnotationStore, AnnotationValue, NewAnnotation};
use crate::classifier::{ClassifierInput, RecordTypeClassifier, RecordTypeVerdict};
use crate::lifecycle::LifecycleManager;
use crate::store::StoreError;
use crate::task::{TaskId, TaskType};
use crate::urls::{HtmlContent, UrlId, UrlRecord};

use super::harness::StageProcessor;
use super::types::StageError;

/// Classifies each URL with a one-element call to the batch classifier.
/// A result count that does not match the input count is fatal.
pub struct RecordTypeStage {
    annotations: Arc<dyn AnnotationStore>,
    lifecycle: Arc<LifecycleManager>,
    classifier: Arc<dyn RecordTypeClassifier>,
}

impl RecordTypeStage {
    pub fn new(
        annotations: Arc<dyn AnnotationStore>,
        lifecycle: Arc<LifecycleManager>,
        classifier: Arc<dyn RecordTypeClassifier>,
    ) -> Self {
        Self {
            annotations,
            lifecycle,
            classifier,
        }
    }
}

#[async_trait]
impl StageProcessor for RecordTypeStage {
    type Item = (UrlRecord, HtmlContent);
    type Output = RecordTypeVerdict;

    fn task_type(&self) -> TaskType {
        TaskType::RecordType
    }

    fn fetch_eligible(&self, limit: usize) -> Result<Vec<Self::Item>, StoreError> {
        self.annotations
            .urls_with_html_missing_auto(AnnotationKind::RecordType, limit)
    }

    fn url_id(item: &Self::Item) -> UrlId {
        item.0.id
    }

    async fn process(&self, item: &Self::Item) -> Result<RecordTypeVerdict, StageError> {
        let (url, html) = item;
        let inputs = [ClassifierInput::new(url, html)];
        let mut verdicts = self.classifier.classify_record_types(&inputs).await?;
        if verdicts.len() != inputs.len() {
            return Err(StageError::Fatal(format!(
                "record type classifier returned {} results for {} inputs",
                verdicts.len(),
                inputs.len()
            )));
        }
        verdicts
            .pop()
            .ok_or_else(|| StageError::Fatal("record type classifier returned no result".into()))
    }

    fn commit(
        &self,
        _task_id: TaskId,
        (url, _): Self::Item,
        verdict: RecordTypeVerdict,
    ) -> Result<(), StageError> {
        let annotation = NewAnnotation::automated(
            url.id,
            AnnotationValue::RecordType {
                record_type: verdict.record_type,
            },
            verdict.confidence,
            verdict.model_name,
        );
        self.lifecycle.record_annotation(&annotation)?;
        Ok(())
    }
}
