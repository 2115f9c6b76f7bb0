//! Agency identification stage.

use std::sync::Arc;

use async_trait::async_trait;

use crate::annotation::{
    AnnotationKind, AnnotationStore, AnnotationValue, NewAnnotation, SuggestionType,
};
use crate::classifier::{AgencyIdentifier, AgencySuggestion};
use crate::lifecycle::LifecycleManager;
use crate::store::StoreError;
use crate::task::{TaskId, TaskType};
use crate::urls::{UrlId, UrlRecord};

use super::harness::StageProcessor;
use super::types::StageError;

pub struct AgencyStage {
    annotations: Arc<dyn AnnotationStore>,
    lifecycle: Arc<LifecycleManager>,
    identifier: Arc<dyn AgencyIdentifier>,
}

impl AgencyStage {
    pub fn new(
        annotations: Arc<dyn AnnotationStore>,
        lifecycle: Arc<LifecycleManager>,
        identifier: Arc<dyn AgencyIdentifier>,
    ) -> Self {
        Self {
            annotations,
            lifecycle,
            identifier,
        }
    }
}

/// Confirmed match first, then the most confident auto suggestion, then a
/// new-agency hint. Nothing usable is recorded as unknown.
fn best_suggestion(suggestions: &[AgencySuggestion]) -> AgencySuggestion {
    let of_type = |wanted: SuggestionType| {
        suggestions
            .iter()
            .filter(move |s| s.suggestion_type == wanted)
    };

    of_type(SuggestionType::Confirmed)
        .find(|s| s.agency_id.is_some())
        .or_else(|| {
            of_type(SuggestionType::AutoSuggestion)
                .filter(|s| s.agency_id.is_some())
                .max_by(|a, b| {
                    let a = a.confidence.unwrap_or(0.0);
                    let b = b.confidence.unwrap_or(0.0);
                    a.total_cmp(&b)
                })
        })
        .or_else(|| of_type(SuggestionType::NewAgency).next())
        .cloned()
        .unwrap_or(AgencySuggestion {
            agency_id: None,
            suggestion_type: SuggestionType::Unknown,
            confidence: None,
        })
}

#[async_trait]
impl StageProcessor for AgencyStage {
    type Item = UrlRecord;
    type Output = AgencySuggestion;

    fn task_type(&self) -> TaskType {
        TaskType::AgencyIdentification
    }

    fn fetch_eligible(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError> {
        self.annotations
            .pending_urls_missing_auto(AnnotationKind::Agency, limit)
    }

    fn url_id(item: &UrlRecord) -> UrlId {
        item.id
    }

    async fn process(&self, url: &UrlRecord) -> Result<AgencySuggestion, StageError> {
        let suggestions = self.identifier.identify_agencies(url).await?;
        Ok(best_suggestion(&suggestions))
    }

    fn commit(
        &self,
        _task_id: TaskId,
        url: UrlRecord,
        suggestion: AgencySuggestion,
    ) -> Result<(), StageError> {
        let annotation = NewAnnotation::automated(
            url.id,
            AnnotationValue::Agency {
                agency_id: suggestion.agency_id,
                suggestion_type: suggestion.suggestion_type,
            },
            suggestion.confidence,
            None,
        );
        self.lifecycle.record_annotation(&annotation)?;
        Ok(())
    }
}
