use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::annotation::{Annotation, AnnotationStore, AnnotationValue, NewAnnotation};
use crate::dedup::{Deduplicator, Registration};
use crate::metrics::STATUS_TRANSITIONS;
use crate::store::StoreError;
use crate::task::{TaskId, TaskStore};
use crate::urls::{BatchId, ReviewOutcome, UrlId, UrlRecord, UrlStatus, UrlStore};

use super::LifecycleError;

/// Compare-and-set attempts before a transition gives up.
const MAX_TRANSITION_ATTEMPTS: usize = 5;

/// What a transition request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied { from: UrlStatus, to: UrlStatus },
    /// Already in the requested status.
    Unchanged,
    /// Validation was requested for a URL without a name; it is `pending`.
    Reverted { from: UrlStatus },
}

pub struct LifecycleManager {
    pub(super) urls: Arc<dyn UrlStore>,
    annotations: Arc<dyn AnnotationStore>,
    tasks: Arc<dyn TaskStore>,
    pub(super) dedup: Deduplicator,
}

impl LifecycleManager {
    pub fn new(
        urls: Arc<dyn UrlStore>,
        annotations: Arc<dyn AnnotationStore>,
        tasks: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            dedup: Deduplicator::new(urls.clone()),
            urls,
            annotations,
            tasks,
        }
    }

    /// Build from a single store implementing every storage trait.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UrlStore + AnnotationStore + TaskStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store)
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn get_url(&self, url_id: UrlId) -> Result<UrlRecord, LifecycleError> {
        self.urls
            .get_url(url_id)?
            .ok_or(LifecycleError::UrlNotFound(url_id))
    }

    /// Move a URL to `target`.
    ///
    /// The write is conditional on the status read, so concurrent writers
    /// cannot interleave; a lost race re-reads and re-validates.
    pub fn transition(
        &self,
        url_id: UrlId,
        target: UrlStatus,
    ) -> Result<TransitionOutcome, LifecycleError> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let url = self.get_url(url_id)?;
            let from = url.status;
            if from == target {
                return Ok(TransitionOutcome::Unchanged);
            }
            if !from.can_transition_to(target) {
                return Err(LifecycleError::InvalidTransition { from, to: target });
            }
            if from == UrlStatus::Submitted
                && UrlStatus::is_downgrade_from_submitted(target)
                && self.urls.data_source_for(url_id)?.is_some()
            {
                return Err(LifecycleError::DataSourceLinked(url_id));
            }

            // A validated URL must carry a name.
            let effective = if target == UrlStatus::Validated && !has_name(&url) {
                UrlStatus::Pending
            } else {
                target
            };
            if effective == from {
                debug!(url_id, "Validation requested for unnamed pending URL; left pending");
                return Ok(TransitionOutcome::Reverted { from });
            }

            match self.urls.update_status_if(url_id, from, effective) {
                Ok(true) => {
                    STATUS_TRANSITIONS
                        .with_label_values(&[from.as_str(), effective.as_str()])
                        .inc();
                    if effective != target {
                        info!(url_id, from = %from, "Unnamed URL reverted to pending instead of validated");
                        return Ok(TransitionOutcome::Reverted { from });
                    }
                    debug!(url_id, from = %from, to = %effective, "URL status changed");
                    return Ok(TransitionOutcome::Applied {
                        from,
                        to: effective,
                    });
                }
                Ok(false) => {
                    debug!(url_id, "Status changed concurrently, retrying transition");
                    continue;
                }
                Err(StoreError::Constraint(_)) => {
                    return Err(LifecycleError::DataSourceLinked(url_id));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LifecycleError::Conflict(url_id))
    }

    /// Append `message` to the task's error log for this URL, then move the
    /// URL to `error` if its current status allows it.
    pub fn mark_error(
        &self,
        task_id: TaskId,
        url_id: UrlId,
        message: &str,
    ) -> Result<TransitionOutcome, LifecycleError> {
        self.tasks.append_error(task_id, Some(url_id), message)?;
        match self.transition(url_id, UrlStatus::Error) {
            Ok(outcome) => Ok(outcome),
            Err(e @ (LifecycleError::InvalidTransition { .. } | LifecycleError::DataSourceLinked(_))) => {
                warn!(url_id, task_id, error = %e, "Error logged but status left unchanged");
                Ok(TransitionOutcome::Unchanged)
            }
            Err(e) => Err(e),
        }
    }

    /// Link the URL to its registered data source and mark it submitted.
    pub fn mark_submitted(
        &self,
        url_id: UrlId,
        data_source_id: i64,
    ) -> Result<TransitionOutcome, LifecycleError> {
        match self.urls.link_data_source(url_id, data_source_id) {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => {
                if self.urls.data_source_for(url_id)? != Some(data_source_id) {
                    return Err(LifecycleError::DataSourceLinked(url_id));
                }
            }
            Err(e) => return Err(e.into()),
        }
        self.transition(url_id, UrlStatus::Submitted)
    }

    pub fn mark_duplicate(&self, url_id: UrlId) -> Result<TransitionOutcome, LifecycleError> {
        self.transition(url_id, UrlStatus::Duplicate)
    }

    /// Request validation. Unnamed URLs end up `pending`.
    pub fn mark_validated(&self, url_id: UrlId) -> Result<TransitionOutcome, LifecycleError> {
        self.transition(url_id, UrlStatus::Validated)
    }

    /// Record a human review. A URL has at most one reviewer; the same
    /// reviewer may record a follow-up outcome.
    pub fn record_review(
        &self,
        url_id: UrlId,
        reviewer: i64,
        outcome: ReviewOutcome,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let target = outcome.as_status();
        let url = self.get_url(url_id)?;
        if url.status != target && !url.status.can_transition_to(target) {
            return Err(LifecycleError::InvalidTransition {
                from: url.status,
                to: target,
            });
        }

        match self.urls.reviewer_for(url_id)? {
            Some(existing) if existing != reviewer => {
                return Err(LifecycleError::ReviewerAlreadyAssigned {
                    url_id,
                    reviewer: existing,
                })
            }
            Some(_) => {}
            None => match self.urls.set_reviewer(url_id, reviewer) {
                Ok(()) => {}
                Err(StoreError::UniqueViolation(_)) => {
                    let existing = self.urls.reviewer_for(url_id)?.unwrap_or(reviewer);
                    if existing != reviewer {
                        return Err(LifecycleError::ReviewerAlreadyAssigned {
                            url_id,
                            reviewer: existing,
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            },
        }

        self.transition(url_id, target)
    }

    /// Set name and/or description; `None` leaves a field unchanged.
    pub fn set_details(
        &self,
        url_id: UrlId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), LifecycleError> {
        match self.urls.update_url_details(url_id, name, description) {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => Err(LifecycleError::UrlNotFound(url_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Store a model-produced annotation, replacing any earlier automated
    /// annotation of the same kind.
    pub fn record_annotation(&self, annotation: &NewAnnotation) -> Result<Annotation, LifecycleError> {
        Ok(self.annotations.upsert_annotation(annotation)?)
    }

    /// Store a reviewer's annotation. It takes precedence over the
    /// automated one when reading the effective value.
    pub fn record_human_annotation(
        &self,
        url_id: UrlId,
        value: AnnotationValue,
        user_id: i64,
    ) -> Result<Annotation, LifecycleError> {
        self.get_url(url_id)?;
        Ok(self
            .annotations
            .upsert_annotation(&NewAnnotation::human(url_id, value, user_id))?)
    }

    /// Revert every `validated` URL without a name to `pending`.
    pub fn enforce_validated_names(&self) -> Result<Vec<UrlId>, LifecycleError> {
        let reverted = self.urls.revert_unnamed_validated()?;
        if !reverted.is_empty() {
            STATUS_TRANSITIONS
                .with_label_values(&[UrlStatus::Validated.as_str(), UrlStatus::Pending.as_str()])
                .inc_by(reverted.len() as u64);
            info!(count = reverted.len(), "Reverted unnamed validated URLs to pending");
        }
        Ok(reverted)
    }

    /// Administrative retry: `error` back to `pending`.
    pub fn reset_error(&self, url_id: UrlId) -> Result<TransitionOutcome, LifecycleError> {
        if self
            .urls
            .update_status_if(url_id, UrlStatus::Error, UrlStatus::Pending)?
        {
            STATUS_TRANSITIONS
                .with_label_values(&[UrlStatus::Error.as_str(), UrlStatus::Pending.as_str()])
                .inc();
            return Ok(TransitionOutcome::Applied {
                from: UrlStatus::Error,
                to: UrlStatus::Pending,
            });
        }
        let url = self.get_url(url_id)?;
        Err(LifecycleError::InvalidTransition {
            from: url.status,
            to: UrlStatus::Pending,
        })
    }

    /// Register a URL found while processing another one, e.g. a redirect
    /// target. No duplicate record is written when it already exists.
    pub fn register_discovered(
        &self,
        raw: &str,
        batch_id: Option<BatchId>,
    ) -> Result<Registration, LifecycleError> {
        Ok(self.dedup.resolve(raw, batch_id, serde_json::Value::Null)?)
    }
}

fn has_name(url: &UrlRecord) -> bool {
    url.name.as_deref().is_some_and(|n| !n.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationKind;
    use crate::store::SqliteStore;
    use crate::task::TaskType;
    use crate::urls::CollectorType;

    fn setup() -> (LifecycleManager, Arc<SqliteStore>, UrlId) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let manager = LifecycleManager::from_store(store.clone());
        let batch = store.create_batch(CollectorType::Ckan, 1).unwrap();
        let url_id = manager
            .register_discovered("https://county.gov/records", Some(batch.id))
            .unwrap()
            .url_id();
        (manager, store, url_id)
    }

    #[test]
    fn test_validate_without_name_stays_pending() {
        let (manager, _, url_id) = setup();
        let outcome = manager.mark_validated(url_id).unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Reverted {
                from: UrlStatus::Pending
            }
        );
        assert_eq!(manager.get_url(url_id).unwrap().status, UrlStatus::Pending);
    }

    #[test]
    fn test_validate_with_name() {
        let (manager, _, url_id) = setup();
        manager.set_details(url_id, Some("County Records"), None).unwrap();
        assert_eq!(
            manager.mark_validated(url_id).unwrap(),
            TransitionOutcome::Applied {
                from: UrlStatus::Pending,
                to: UrlStatus::Validated
            }
        );
    }

    #[test]
    fn test_blank_name_counts_as_missing() {
        let (manager, _, url_id) = setup();
        manager.set_details(url_id, Some("   "), None).unwrap();
        assert!(matches!(
            manager.mark_validated(url_id).unwrap(),
            TransitionOutcome::Reverted { .. }
        ));
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let (manager, _, url_id) = setup();
        manager.mark_duplicate(url_id).unwrap();
        let err = manager.transition(url_id, UrlStatus::Pending).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: UrlStatus::Duplicate,
                to: UrlStatus::Pending
            }
        ));
    }

    #[test]
    fn test_submitted_with_data_source_cannot_downgrade() {
        let (manager, _, url_id) = setup();
        manager.set_details(url_id, Some("Records"), None).unwrap();
        manager.mark_validated(url_id).unwrap();
        manager.mark_submitted(url_id, 77).unwrap();

        for target in [UrlStatus::Pending, UrlStatus::Error, UrlStatus::Duplicate] {
            assert!(matches!(
                manager.transition(url_id, target),
                Err(LifecycleError::DataSourceLinked(_))
            ));
        }
        // Review outcomes remain possible.
        manager
            .record_review(url_id, 9, ReviewOutcome::Approved)
            .unwrap();
        assert_eq!(manager.get_url(url_id).unwrap().status, UrlStatus::Approved);
    }

    #[test]
    fn test_mark_submitted_is_idempotent_for_same_source() {
        let (manager, _, url_id) = setup();
        manager.set_details(url_id, Some("Records"), None).unwrap();
        manager.mark_validated(url_id).unwrap();
        manager.mark_submitted(url_id, 5).unwrap();
        assert_eq!(
            manager.mark_submitted(url_id, 5).unwrap(),
            TransitionOutcome::Unchanged
        );
        assert!(matches!(
            manager.mark_submitted(url_id, 6),
            Err(LifecycleError::DataSourceLinked(_))
        ));
    }

    #[test]
    fn test_single_reviewer_per_url() {
        let (manager, _, url_id) = setup();
        manager.set_details(url_id, Some("Records"), None).unwrap();
        manager.mark_validated(url_id).unwrap();
        manager.mark_submitted(url_id, 1).unwrap();

        manager
            .record_review(url_id, 3, ReviewOutcome::HumanLabeling)
            .unwrap();
        let err = manager
            .record_review(url_id, 4, ReviewOutcome::Approved)
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::ReviewerAlreadyAssigned { reviewer: 3, .. }
        ));
        manager
            .record_review(url_id, 3, ReviewOutcome::Rejected)
            .unwrap();
        assert_eq!(manager.get_url(url_id).unwrap().status, UrlStatus::Rejected);
    }

    #[test]
    fn test_review_requires_submission() {
        let (manager, store, url_id) = setup();
        let err = manager
            .record_review(url_id, 3, ReviewOutcome::Approved)
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        // No reviewer was recorded for the rejected attempt.
        assert_eq!(store.reviewer_for(url_id).unwrap(), None);
    }

    #[test]
    fn test_mark_error_appends_and_transitions() {
        let (manager, store, url_id) = setup();
        let task = store.create_task(TaskType::Html).unwrap();
        manager.mark_error(task.id, url_id, "HTTP 500").unwrap();
        assert_eq!(manager.get_url(url_id).unwrap().status, UrlStatus::Error);

        // A second failure still gets logged.
        assert_eq!(
            manager.mark_error(task.id, url_id, "HTTP 502").unwrap(),
            TransitionOutcome::Unchanged
        );
        assert_eq!(store.errors_for_url(url_id).unwrap().len(), 2);

        manager.reset_error(url_id).unwrap();
        assert_eq!(manager.get_url(url_id).unwrap().status, UrlStatus::Pending);
        assert!(manager.reset_error(url_id).is_err());
    }

    #[test]
    fn test_enforce_validated_names_sweep() {
        let (manager, store, url_id) = setup();
        // Bypass the manager to simulate a row written before the rule.
        store
            .update_status_if(url_id, UrlStatus::Pending, UrlStatus::Validated)
            .unwrap();
        assert_eq!(manager.enforce_validated_names().unwrap(), vec![url_id]);
        assert_eq!(manager.get_url(url_id).unwrap().status, UrlStatus::Pending);
    }

    #[test]
    fn test_human_annotation_takes_precedence() {
        let (manager, store, url_id) = setup();
        manager
            .record_annotation(&NewAnnotation::automated(
                url_id,
                AnnotationValue::Relevant { is_relevant: true },
                Some(0.6),
                None,
            ))
            .unwrap();
        manager
            .record_human_annotation(url_id, AnnotationValue::Relevant { is_relevant: false }, 2)
            .unwrap();
        let effective = store
            .effective_annotation(url_id, AnnotationKind::Relevant)
            .unwrap()
            .unwrap();
        assert_eq!(effective.value, AnnotationValue::Relevant { is_relevant: false });

        assert!(matches!(
            manager.record_human_annotation(999, AnnotationValue::Relevant { is_relevant: true }, 2),
            Err(LifecycleError::UrlNotFound(999))
        ));
    }

    #[test]
    fn test_unknown_url() {
        let (manager, _, _) = setup();
        assert!(matches!(
            manager.transition(999, UrlStatus::Error),
            Err(LifecycleError::UrlNotFound(999))
        ));
        assert!(matches!(
            manager.set_details(999, Some("x"), None),
            Err(LifecycleError::UrlNotFound(999))
        ));
    }
}
