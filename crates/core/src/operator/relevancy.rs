//! Relevancy stage: ask the classifier whether a page is relevant.

use std::sync::Arc;

use async_trait::async_trait;

use crate::annotation::{AnnotationKind, AnnotationStore, AnnotationValue, NewAnnotation};
use crate::classifier::{ClassifierInput, RelevanceClassifier, RelevanceVerdict};
use crate::lifecycle::LifecycleManager;
use crate::store::StoreError;
use crate::task::{TaskId, TaskType};
use crate::urls::{HtmlContent, UrlId, UrlRecord};

use super::harness::StageProcessor;
use super::types::StageError;

pub struct RelevancyStage {
    annotations: Arc<dyn AnnotationStore>,
    lifecycle: Arc<LifecycleManager>,
    classifier: Arc<dyn RelevanceClassifier>,
}

impl RelevancyStage {
    pub fn new(
        annotations: Arc<dyn AnnotationStore>,
        lifecycle: Arc<LifecycleManager>,
        classifier: Arc<dyn RelevanceClassifier>,
    ) -> Self {
        Self {
            annotations,
            lifecycle,
            classifier,
        }
    }
}

#[async_trait]
impl StageProcessor for RelevancyStage {
    type Item = (UrlRecord, HtmlContent);
    type Output = RelevanceVerdict;

    fn task_type(&self) -> TaskType {
        TaskType::Relevancy
    }

    fn fetch_eligible(&self, limit: usize) -> Result<Vec<Self::Item>, StoreError> {
        self.annotations
            .urls_with_html_missing_auto(AnnotationKind::Relevant, limit)
    }

    fn url_id(item: &Self::Item) -> UrlId {
        item.0.id
    }

    async fn process(&self, item: &Self::Item) -> Result<RelevanceVerdict, StageError> {
        let (url, html) = item;
        let input = ClassifierInput::new(url, html);
        Ok(self.classifier.classify_relevance(&input).await?)
    }

    fn commit(
        &self,
        _task_id: TaskId,
        (url, _): Self::Item,
        verdict: RelevanceVerdict,
    ) -> Result<(), StageError> {
        let annotation = NewAnnotation::automated(
            url.id,
            AnnotationValue::Relevant {
                is_relevant: verdict.is_relevant,
            },
            verdict.confidence,
            verdict.model_name,
        );
        self.lifecycle.record_annotation(&annotation)?;
        Ok(())
    }
}
