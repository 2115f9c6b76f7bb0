use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::metrics::{TASK_RUNS, TASK_RUN_DURATION};
use crate::operator::{Operator, OperatorError, RunInfo};
use crate::task::{TaskStatus, TaskStore, TaskType};

use super::{AgencySource, AgencyStore, SyncState};

/// Cursor name for the agency sync.
pub const AGENCY_SYNC: &str = "agencies";

/// Pulls agencies page by page and upserts them.
///
/// The cursor is saved after every page, so a failed run resumes where it
/// stopped. A completed pass resets the cursor and records the pass time;
/// the next pass only asks for agencies updated since then.
pub struct AgencySyncOperator {
    source: Arc<dyn AgencySource>,
    agencies: Arc<dyn AgencyStore>,
    tasks: Arc<dyn TaskStore>,
}

impl AgencySyncOperator {
    pub fn new(
        source: Arc<dyn AgencySource>,
        agencies: Arc<dyn AgencyStore>,
        tasks: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            source,
            agencies,
            tasks,
        }
    }

    /// Sync at most `max_pages` pages.
    pub async fn sync(&self, max_pages: usize) -> Result<RunInfo, OperatorError> {
        let started = Instant::now();
        let task = self.tasks.create_task(TaskType::Sync)?;
        let mut info = RunInfo::started(task.id, TaskType::Sync, Vec::new());
        let mut state = self.agencies.sync_state(AGENCY_SYNC)?;
        info!(task_id = task.id, page = state.next_page, "Agency sync started");

        let mut pages = 0;
        let finished = loop {
            if pages >= max_pages.max(1) {
                break false;
            }
            let page = match self
                .source
                .fetch_agencies(state.next_page, state.last_synced_at)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(task_id = task.id, page = state.next_page, error = %e, "Agency page failed");
                    self.tasks.append_error(
                        task.id,
                        None,
                        &format!("page {}: {}", state.next_page, e),
                    )?;
                    info.errored += 1;
                    break false;
                }
            };
            if page.is_empty() {
                break true;
            }

            let written = self.agencies.upsert_agencies(&page)?;
            info.processed += written;
            info.succeeded += written;
            pages += 1;
            debug!(page = state.next_page, written, "Agency page synced");

            state.next_page += 1;
            self.agencies.save_sync_state(AGENCY_SYNC, &state)?;
        };

        if finished {
            let state = SyncState {
                next_page: 1,
                last_synced_at: Some(Utc::now()),
            };
            self.agencies.save_sync_state(AGENCY_SYNC, &state)?;
        } else if info.errored == 0 {
            info!(task_id = task.id, pages, "Agency sync paused at page limit");
        }

        let status = if info.errored > 0 {
            TaskStatus::Error
        } else {
            TaskStatus::Complete
        };
        self.tasks.finish_task(task.id, status)?;

        info.duration = started.elapsed();
        let result = if info.errored > 0 { "error" } else { "complete" };
        TASK_RUNS.with_label_values(&["sync", result]).inc();
        TASK_RUN_DURATION
            .with_label_values(&["sync"])
            .observe(info.duration.as_secs_f64());
        info!(task_id = task.id, agencies = info.processed, finished, "Agency sync finished");
        Ok(info)
    }
}

#[async_trait]
impl Operator for AgencySyncOperator {
    fn task_type(&self) -> TaskType {
        TaskType::Sync
    }

    async fn has_work(&self) -> Result<bool, OperatorError> {
        Ok(true)
    }

    /// `batch_size` caps the number of pages fetched.
    async fn run_task(&self, batch_size: usize) -> Result<RunInfo, OperatorError> {
        self.sync(batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierError;
    use crate::store::SqliteStore;
    use crate::sync::Agency;
    use crate::testing::MockAgencySource;

    fn agencies(ids: std::ops::Range<i64>) -> Vec<Agency> {
        ids.map(|id| Agency {
            id,
            name: format!("Agency {id}"),
            state: Some("OH".into()),
            county: None,
            locality: None,
        })
        .collect()
    }

    fn operator(source: &MockAgencySource) -> (AgencySyncOperator, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let op = AgencySyncOperator::new(Arc::new(source.clone()), store.clone(), store.clone());
        (op, store)
    }

    #[tokio::test]
    async fn test_full_pass_resets_cursor() {
        let source = MockAgencySource::new();
        source.set_pages(vec![agencies(1..3), agencies(3..5)]).await;
        let (op, store) = operator(&source);

        let info = op.sync(10).await.unwrap();
        assert_eq!(info.processed, 4);
        assert_eq!(store.count_agencies().unwrap(), 4);

        let state = store.sync_state(AGENCY_SYNC).unwrap();
        assert_eq!(state.next_page, 1);
        assert!(state.last_synced_at.is_some());
        assert_eq!(
            store.get_task(info.task_id.unwrap()).unwrap().unwrap().status,
            TaskStatus::Complete
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_cursor() {
        let source = MockAgencySource::new();
        source.set_pages(vec![agencies(1..3), agencies(3..5)]).await;
        source.fail_page(2, ClassifierError::Transient("503".into())).await;
        let (op, store) = operator(&source);

        let info = op.sync(10).await.unwrap();
        assert_eq!(info.processed, 2);
        assert_eq!(info.errored, 1);
        let state = store.sync_state(AGENCY_SYNC).unwrap();
        assert_eq!(state.next_page, 2);
        assert!(state.last_synced_at.is_none());

        let task = store.get_task(info.task_id.unwrap()).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_asks_for_updates_only() {
        let source = MockAgencySource::new();
        source.set_pages(vec![agencies(1..2)]).await;
        let (op, _) = operator(&source);

        op.sync(10).await.unwrap();
        op.sync(10).await.unwrap();

        let calls = source.recorded_calls().await;
        assert_eq!(calls[0], (1, None));
        assert!(calls.iter().any(|(page, since)| *page == 1 && since.is_some()));
    }

    #[tokio::test]
    async fn test_page_limit_pauses() {
        let source = MockAgencySource::new();
        source
            .set_pages(vec![agencies(1..2), agencies(2..3), agencies(3..4)])
            .await;
        let (op, store) = operator(&source);

        op.sync(2).await.unwrap();
        assert_eq!(store.sync_state(AGENCY_SYNC).unwrap().next_page, 3);
        op.sync(2).await.unwrap();
        assert_eq!(store.count_agencies().unwrap(), 3);
        assert_eq!(store.sync_state(AGENCY_SYNC).unwrap().next_page, 1);
    }
}
