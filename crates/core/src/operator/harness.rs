//! Generic batch runner shared by every URL stage.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::lifecycle::LifecycleManager;
use crate::metrics::{TASK_ITEMS, TASK_ITEM_RETRIES, TASK_RUNS, TASK_RUN_DURATION};
use crate::store::StoreError;
use crate::task::{TaskId, TaskStatus, TaskStore, TaskType};
use crate::urls::UrlId;

use super::config::OperatorConfig;
use super::types::{OperatorError, RunInfo, StageError};

/// The stage-specific half of a task operator.
///
/// `process` runs concurrently and may suspend on I/O. `fetch_eligible` and
/// `commit` are storage calls made from the runner loop, one at a time.
#[async_trait]
pub trait StageProcessor: Send + Sync + 'static {
    type Item: Send + Sync + 'static;
    type Output: Send + 'static;

    fn task_type(&self) -> TaskType;

    /// Up to `limit` items that still need this stage.
    fn fetch_eligible(&self, limit: usize) -> Result<Vec<Self::Item>, StoreError>;

    fn url_id(item: &Self::Item) -> UrlId;

    async fn process(&self, item: &Self::Item) -> Result<Self::Output, StageError>;

    /// Apply a successful result.
    fn commit(&self, task_id: TaskId, item: Self::Item, output: Self::Output)
        -> Result<(), StageError>;
}

/// A runnable stage, as seen by the task manager.
#[async_trait]
pub trait Operator: Send + Sync {
    fn task_type(&self) -> TaskType;

    /// Whether a run would find anything to do.
    async fn has_work(&self) -> Result<bool, OperatorError>;

    async fn run_task(&self, batch_size: usize) -> Result<RunInfo, OperatorError>;
}

/// Runs a [`StageProcessor`] over a batch of eligible URLs.
pub struct TaskOperator<P: StageProcessor> {
    stage: Arc<P>,
    lifecycle: Arc<LifecycleManager>,
    tasks: Arc<dyn TaskStore>,
    config: OperatorConfig,
}

impl<P: StageProcessor> TaskOperator<P> {
    pub fn new(
        stage: P,
        lifecycle: Arc<LifecycleManager>,
        tasks: Arc<dyn TaskStore>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            stage: Arc::new(stage),
            lifecycle,
            tasks,
            config,
        }
    }

    pub fn stage(&self) -> &P {
        &self.stage
    }

    /// Pull up to `batch_size` eligible URLs and process them.
    ///
    /// Item failures are logged against the task and the URL is moved to
    /// `error`; the run carries on. A fatal item error stops the run and is
    /// returned. When the batch deadline passes, unfinished items are
    /// dropped and the partial summary is returned with `timed_out` set.
    pub async fn run(&self, batch_size: usize) -> Result<RunInfo, OperatorError> {
        let started = Instant::now();
        let task_type = self.stage.task_type();

        let items = self.stage.fetch_eligible(batch_size)?;
        if items.is_empty() {
            debug!(task_type = %task_type, "No eligible URLs");
            return Ok(RunInfo::empty(task_type, started.elapsed()));
        }

        let url_ids: Vec<UrlId> = items.iter().map(P::url_id).collect();
        let total = url_ids.len();
        let task = self.tasks.create_task(task_type)?;
        if let Err(e) = self.tasks.link_urls(task.id, &url_ids) {
            self.fail_task(task.id, task_type, &e.to_string());
            return Err(e.into());
        }
        info!(task_id = task.id, task_type = %task_type, items = total, "Task started");

        let mut info = RunInfo::started(task.id, task_type, url_ids);
        let deadline = tokio::time::Instant::now() + self.config.batch_timeout();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut workers = JoinSet::new();

        for item in items {
            let stage = Arc::clone(&self.stage);
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (item, Err(StageError::Fatal("worker pool closed".to_string())));
                };
                let result = process_with_retry(stage.as_ref(), &item, &config).await;
                (item, result)
            });
        }

        let outcome: Result<(), OperatorError> = loop {
            let joined = match tokio::time::timeout_at(deadline, workers.join_next()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break Ok(()),
                Err(_) => {
                    info.timed_out = true;
                    info.abandoned = total - info.processed;
                    warn!(
                        task_id = task.id,
                        task_type = %task_type,
                        abandoned = info.abandoned,
                        "Task timed out, discarding unfinished items"
                    );
                    break Ok(());
                }
            };

            let (item, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    break Err(OperatorError::Fatal {
                        task_type,
                        message: format!("item worker failed: {}", e),
                    })
                }
            };

            let url_id = P::url_id(&item);
            let failure = match result {
                Ok(output) => self.stage.commit(task.id, item, output).err(),
                Err(e) => Some(e),
            };
            info.processed += 1;

            let Some(err) = failure else {
                info.succeeded += 1;
                continue;
            };
            if let StageError::Fatal(message) = err {
                error!(task_id = task.id, url_id, error = %message, "Fatal item error, aborting task");
                break Err(OperatorError::Fatal { task_type, message });
            }

            info.errored += 1;
            debug!(task_id = task.id, url_id, error = %err, "Item failed");
            if let Err(e) = self.lifecycle.mark_error(task.id, url_id, &err.to_string()) {
                if e.is_fatal() {
                    break Err(e.into());
                }
                warn!(task_id = task.id, url_id, error = %e, "Could not mark URL as errored");
            }

            if let Some(limit) = self.config.max_item_failures {
                if info.errored >= limit {
                    info.aborted = true;
                    info.abandoned = total - info.processed;
                    warn!(
                        task_id = task.id,
                        task_type = %task_type,
                        errored = info.errored,
                        "Item failure threshold reached, aborting task"
                    );
                    break Ok(());
                }
            }
        };

        // Results still in flight are discarded, never applied.
        workers.abort_all();
        info.duration = started.elapsed();
        TASK_RUN_DURATION
            .with_label_values(&[task_type.as_str()])
            .observe(info.duration.as_secs_f64());

        if let Err(e) = outcome {
            TASK_RUNS.with_label_values(&[task_type.as_str(), "fatal"]).inc();
            self.fail_task(task.id, task_type, &e.to_string());
            return Err(e);
        }

        record_item_metrics(&info);
        let status = if info.timed_out {
            self.tasks.append_error(
                task.id,
                None,
                &format!(
                    "timed out after {}s with {} items unfinished",
                    self.config.batch_timeout_secs, info.abandoned
                ),
            )?;
            TaskStatus::Error
        } else if info.aborted {
            self.tasks.append_error(
                task.id,
                None,
                &format!("aborted after {} item failures", info.errored),
            )?;
            TaskStatus::Error
        } else {
            TaskStatus::Complete
        };
        self.tasks.finish_task(task.id, status)?;
        TASK_RUNS
            .with_label_values(&[task_type.as_str(), info.result_label()])
            .inc();

        info!(
            task_id = task.id,
            task_type = %task_type,
            processed = info.processed,
            succeeded = info.succeeded,
            errored = info.errored,
            duration_ms = info.duration.as_millis() as u64,
            "Task finished"
        );
        Ok(info)
    }

    /// Best effort: the run is already failing.
    fn fail_task(&self, task_id: TaskId, task_type: TaskType, message: &str) {
        if let Err(e) = self.tasks.append_error(task_id, None, message) {
            error!(task_id, task_type = %task_type, error = %e, "Failed to record task error");
        }
        if let Err(e) = self.tasks.finish_task(task_id, TaskStatus::Error) {
            error!(task_id, task_type = %task_type, error = %e, "Failed to close task");
        }
    }
}

#[async_trait]
impl<P: StageProcessor> Operator for TaskOperator<P> {
    fn task_type(&self) -> TaskType {
        self.stage.task_type()
    }

    async fn has_work(&self) -> Result<bool, OperatorError> {
        Ok(!self.stage.fetch_eligible(1)?.is_empty())
    }

    async fn run_task(&self, batch_size: usize) -> Result<RunInfo, OperatorError> {
        self.run(batch_size).await
    }
}

async fn process_with_retry<P: StageProcessor>(
    stage: &P,
    item: &P::Item,
    config: &OperatorConfig,
) -> Result<P::Output, StageError> {
    let mut attempt = 0;
    loop {
        match stage.process(item).await {
            Err(StageError::Retryable(message)) if attempt < config.max_retries => {
                let delay = config.backoff_for(attempt);
                debug!(
                    url_id = P::url_id(item),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Retrying item"
                );
                TASK_ITEM_RETRIES
                    .with_label_values(&[stage.task_type().as_str()])
                    .inc();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn record_item_metrics(info: &RunInfo) {
    let task_type = info.task_type.as_str();
    for (outcome, count) in [
        ("succeeded", info.succeeded),
        ("errored", info.errored),
        ("abandoned", info.abandoned),
    ] {
        if count > 0 {
            TASK_ITEMS
                .with_label_values(&[task_type, outcome])
                .inc_by(count as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::store::SqliteStore;
    use crate::urls::{CollectorType, UrlStatus, UrlStore};

    /// Stage whose per-URL behaviour is scripted by the test.
    struct ScriptedStage {
        store: Arc<SqliteStore>,
        script: HashMap<UrlId, Vec<Result<(), StageError>>>,
        delays: HashMap<UrlId, Duration>,
        calls: Mutex<HashMap<UrlId, usize>>,
        committed: Mutex<Vec<UrlId>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedStage {
        fn new(store: Arc<SqliteStore>) -> Self {
            Self {
                store,
                script: HashMap::new(),
                delays: HashMap::new(),
                calls: Mutex::new(HashMap::new()),
                committed: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn calls_for(&self, url_id: UrlId) -> usize {
            self.calls.lock().unwrap().get(&url_id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl StageProcessor for ScriptedStage {
        type Item = UrlId;
        type Output = ();

        fn task_type(&self) -> TaskType {
            TaskType::Html
        }

        fn fetch_eligible(&self, limit: usize) -> Result<Vec<UrlId>, StoreError> {
            let committed = self.committed.lock().unwrap().clone();
            let filter = crate::urls::UrlFilter::new().with_status(UrlStatus::Pending);
            Ok(self
                .store
                .list_urls(&filter)?
                .into_iter()
                .map(|u| u.id)
                .filter(|id| !committed.contains(id))
                .take(limit)
                .collect())
        }

        fn url_id(item: &UrlId) -> UrlId {
            *item
        }

        async fn process(&self, item: &UrlId) -> Result<(), StageError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(*item).or_insert(0);
                *n += 1;
                *n - 1
            };
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(item) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.script
                .get(item)
                .and_then(|results| results.get(call).cloned())
                .unwrap_or(Ok(()))
        }

        fn commit(&self, _task_id: TaskId, item: UrlId, _output: ()) -> Result<(), StageError> {
            self.committed.lock().unwrap().push(item);
            Ok(())
        }
    }

    fn setup(count: usize) -> (Arc<SqliteStore>, Arc<LifecycleManager>, Vec<UrlId>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let lifecycle = Arc::new(LifecycleManager::from_store(store.clone()));
        let batch = store.create_batch(CollectorType::Manual, 1).unwrap();
        let ids = (0..count)
            .map(|i| {
                lifecycle
                    .register_discovered(&format!("https://agency{i}.gov/records"), Some(batch.id))
                    .unwrap()
                    .url_id()
            })
            .collect();
        (store, lifecycle, ids)
    }

    fn operator(
        stage: ScriptedStage,
        store: &Arc<SqliteStore>,
        lifecycle: &Arc<LifecycleManager>,
        config: OperatorConfig,
    ) -> TaskOperator<ScriptedStage> {
        TaskOperator::new(stage, lifecycle.clone(), store.clone(), config)
    }

    fn fast_config() -> OperatorConfig {
        OperatorConfig {
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_run_creates_no_task() {
        let (store, lifecycle, _) = setup(0);
        let op = operator(ScriptedStage::new(store.clone()), &store, &lifecycle, fast_config());
        let info = op.run(10).await.unwrap();
        assert!(info.is_empty());
        assert_eq!(info.processed, 0);
        assert!(!op.has_work().await.unwrap());
    }

    #[tokio::test]
    async fn test_item_failure_does_not_stop_batch() {
        let (store, lifecycle, ids) = setup(3);
        let mut stage = ScriptedStage::new(store.clone());
        stage
            .script
            .insert(ids[1], vec![Err(StageError::Permanent("bad page".into()))]);
        let op = operator(stage, &store, &lifecycle, fast_config());

        let info = op.run(10).await.unwrap();
        assert_eq!(info.processed, 3);
        assert_eq!(info.succeeded, 2);
        assert_eq!(info.errored, 1);

        assert_eq!(store.get_url(ids[1]).unwrap().unwrap().status, UrlStatus::Error);
        let task = store.get_task(info.task_id.unwrap()).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Complete);
        assert_eq!(task.url_ids.len(), 3);
        assert_eq!(task.errors.len(), 1);
        assert_eq!(task.errors[0].url_id, Some(ids[1]));
        assert_eq!(task.errors[0].message, "bad page");
    }

    #[tokio::test]
    async fn test_retryable_error_is_retried() {
        let (store, lifecycle, ids) = setup(1);
        let mut stage = ScriptedStage::new(store.clone());
        stage.script.insert(
            ids[0],
            vec![
                Err(StageError::Retryable("503".into())),
                Err(StageError::Retryable("503".into())),
                Ok(()),
            ],
        );
        let op = operator(stage, &store, &lifecycle, fast_config());

        let info = op.run(10).await.unwrap();
        assert_eq!(info.succeeded, 1);
        assert_eq!(op.stage().calls_for(ids[0]), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_marks_error() {
        let (store, lifecycle, ids) = setup(1);
        let mut stage = ScriptedStage::new(store.clone());
        stage
            .script
            .insert(ids[0], vec![Err(StageError::Retryable("timeout".into())); 5]);
        let config = OperatorConfig {
            max_retries: 1,
            ..fast_config()
        };
        let op = operator(stage, &store, &lifecycle, config);

        let info = op.run(10).await.unwrap();
        assert_eq!(info.errored, 1);
        assert_eq!(op.stage().calls_for(ids[0]), 2);
        assert_eq!(store.get_url(ids[0]).unwrap().unwrap().status, UrlStatus::Error);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_run() {
        let (store, lifecycle, ids) = setup(2);
        let mut stage = ScriptedStage::new(store.clone());
        stage
            .script
            .insert(ids[0], vec![Err(StageError::Fatal("database is gone".into()))]);
        stage.delays.insert(ids[1], Duration::from_secs(30));
        let op = operator(stage, &store, &lifecycle, fast_config());

        let err = op.run(10).await.unwrap_err();
        assert!(matches!(err, OperatorError::Fatal { task_type: TaskType::Html, .. }));

        // The fatal error is not a per-URL failure.
        assert_eq!(store.get_url(ids[0]).unwrap().unwrap().status, UrlStatus::Pending);
        let task = store.get_task(1).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.errors[0].url_id, None);
    }

    #[tokio::test]
    async fn test_timeout_returns_partial_summary() {
        let (store, lifecycle, ids) = setup(2);
        let mut stage = ScriptedStage::new(store.clone());
        stage.delays.insert(ids[1], Duration::from_secs(30));
        let config = OperatorConfig {
            batch_timeout_secs: 1,
            ..fast_config()
        };
        let op = operator(stage, &store, &lifecycle, config);

        let info = op.run(10).await.unwrap();
        assert!(info.timed_out);
        assert_eq!(info.succeeded, 1);
        assert_eq!(info.abandoned, 1);
        assert_eq!(*op.stage().committed.lock().unwrap(), vec![ids[0]]);

        let task = store.get_task(info.task_id.unwrap()).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (store, lifecycle, ids) = setup(6);
        let mut stage = ScriptedStage::new(store.clone());
        for id in &ids {
            stage.delays.insert(*id, Duration::from_millis(20));
        }
        let config = OperatorConfig {
            max_concurrency: 2,
            ..fast_config()
        };
        let op = operator(stage, &store, &lifecycle, config);

        let info = op.run(10).await.unwrap();
        assert_eq!(info.succeeded, 6);
        assert!(op.stage().max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_threshold_aborts_early() {
        let (store, lifecycle, ids) = setup(4);
        let mut stage = ScriptedStage::new(store.clone());
        for id in &ids {
            stage
                .script
                .insert(*id, vec![Err(StageError::Permanent("nope".into()))]);
        }
        let config = OperatorConfig {
            max_concurrency: 1,
            max_item_failures: Some(2),
            ..fast_config()
        };
        let op = operator(stage, &store, &lifecycle, config);

        let info = op.run(10).await.unwrap();
        assert!(info.aborted);
        assert_eq!(info.errored, 2);
        assert_eq!(info.abandoned, 2);
    }

    #[tokio::test]
    async fn test_batch_size_limits_items() {
        let (store, lifecycle, _) = setup(5);
        let op = operator(ScriptedStage::new(store.clone()), &store, &lifecycle, fast_config());

        let info = op.run(2).await.unwrap();
        assert_eq!(info.processed, 2);
        assert_eq!(info.url_ids.len(), 2);
        assert!(op.has_work().await.unwrap());
    }
}
