//! Runs the URL stages in order and exposes the task status surface.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::operator::{Operator, OperatorConfig, OperatorError, RunInfo};
use crate::task::TaskType;
use crate::trigger::FunctionTrigger;

/// What the manager is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "task_type", rename_all = "snake_case")]
pub enum ManagerStatus {
    Idle,
    Running(TaskType),
}

impl fmt::Display for ManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerStatus::Idle => f.write_str("idle"),
            ManagerStatus::Running(task_type) => write!(f, "running {}", task_type),
        }
    }
}

/// Owns the stage operators and the triggers that drive them.
pub struct TaskManager {
    operators: Vec<Arc<dyn Operator>>,
    sync: Option<Arc<dyn Operator>>,
    config: OperatorConfig,
    status: Mutex<ManagerStatus>,
    url_tasks: FunctionTrigger,
    sync_trigger: FunctionTrigger,
}

impl TaskManager {
    /// `operators` run in the given order on each pass.
    pub fn new(
        operators: Vec<Arc<dyn Operator>>,
        sync: Option<Arc<dyn Operator>>,
        config: OperatorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<TaskManager>| {
            let url_weak = weak.clone();
            let url_tasks = FunctionTrigger::new("url_tasks", move || {
                let manager = url_weak.upgrade();
                async move {
                    if let Some(manager) = manager {
                        manager.run_tasks().await;
                    }
                }
            });

            let sync_weak = weak.clone();
            let sync_trigger = FunctionTrigger::new("agency_sync", move || {
                let manager = sync_weak.upgrade();
                async move {
                    if let Some(manager) = manager {
                        manager.run_sync().await;
                    }
                }
            });

            Self {
                operators,
                sync,
                config,
                status: Mutex::new(ManagerStatus::Idle),
                url_tasks,
                sync_trigger,
            }
        })
    }

    pub fn status(&self) -> ManagerStatus {
        *self.lock_status()
    }

    /// Task types of the registered URL stages, in run order.
    pub fn task_types(&self) -> Vec<TaskType> {
        self.operators.iter().map(|op| op.task_type()).collect()
    }

    /// Run the URL stages, or ask the pass in flight to go round again.
    pub async fn trigger_task_run(&self) {
        self.url_tasks.trigger_or_rerun().await;
    }

    /// Run the agency sync, coalescing overlapping requests.
    pub async fn trigger_sync(&self) {
        if self.sync.is_some() {
            self.sync_trigger.trigger_or_rerun().await;
        }
    }

    /// One pass over every stage.
    ///
    /// Each stage runs repeatedly while it has eligible URLs, up to
    /// `repeat_threshold` runs; then the pass moves on with a warning. A
    /// fatal run ends that stage's turn.
    pub async fn run_tasks(&self) -> Vec<RunInfo> {
        let mut runs = Vec::new();
        for operator in &self.operators {
            let task_type = operator.task_type();
            let mut count = 0;
            loop {
                match operator.has_work().await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        error!(task_type = %task_type, error = %e, "Eligibility check failed");
                        break;
                    }
                }
                if count >= self.config.repeat_threshold {
                    warn!(
                        task_type = %task_type,
                        runs = count,
                        "Task type keeps finding work; moving on"
                    );
                    break;
                }

                self.set_status(ManagerStatus::Running(task_type));
                let result = operator.run_task(self.config.batch_size).await;
                count += 1;
                match result {
                    Ok(info) if info.is_empty() => break,
                    Ok(info) => runs.push(info),
                    Err(e) => {
                        error!(task_type = %task_type, error = %e, "Task run failed");
                        break;
                    }
                }
            }
        }
        self.set_status(ManagerStatus::Idle);
        debug!(runs = runs.len(), "Task pass finished");
        runs
    }

    /// Run a single stage once.
    pub async fn run_task(
        &self,
        task_type: TaskType,
        batch_size: usize,
    ) -> Result<RunInfo, OperatorError> {
        let operator = self
            .find(task_type)
            .ok_or(OperatorError::UnknownTask(task_type))?;
        self.set_status(ManagerStatus::Running(task_type));
        let result = operator.run_task(batch_size).await;
        self.set_status(ManagerStatus::Idle);
        result
    }

    async fn run_sync(&self) {
        let Some(sync) = &self.sync else {
            return;
        };
        self.set_status(ManagerStatus::Running(TaskType::Sync));
        match sync.run_task(self.config.batch_size).await {
            Ok(info) => info!(agencies = info.processed, "Sync run finished"),
            Err(e) => error!(error = %e, "Sync run failed"),
        }
        self.set_status(ManagerStatus::Idle);
    }

    fn find(&self, task_type: TaskType) -> Option<Arc<dyn Operator>> {
        self.operators
            .iter()
            .chain(self.sync.iter())
            .find(|op| op.task_type() == task_type)
            .cloned()
    }

    fn set_status(&self, status: ManagerStatus) {
        *self.lock_status() = status;
    }

    fn lock_status(&self) -> MutexGuard<'_, ManagerStatus> {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Operator with a fixed amount of work, one unit per run.
    struct CountingOperator {
        task_type: TaskType,
        remaining: AtomicUsize,
        runs: AtomicUsize,
        fail: bool,
    }

    impl CountingOperator {
        fn new(task_type: TaskType, work: usize) -> Arc<Self> {
            Arc::new(Self {
                task_type,
                remaining: AtomicUsize::new(work),
                runs: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing(task_type: TaskType) -> Arc<Self> {
            Arc::new(Self {
                task_type,
                remaining: AtomicUsize::new(usize::MAX),
                runs: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl Operator for CountingOperator {
        fn task_type(&self) -> TaskType {
            self.task_type
        }

        async fn has_work(&self) -> Result<bool, OperatorError> {
            Ok(self.remaining.load(Ordering::SeqCst) > 0)
        }

        async fn run_task(&self, _batch_size: usize) -> Result<RunInfo, OperatorError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.fail {
                return Err(OperatorError::Fatal {
                    task_type: self.task_type,
                    message: "database unreachable".into(),
                });
            }
            self.remaining.fetch_sub(1, Ordering::SeqCst);
            let mut info = RunInfo::started(run as i64 + 1, self.task_type, vec![]);
            info.processed = 1;
            info.succeeded = 1;
            Ok(info)
        }
    }

    fn config(repeat_threshold: usize) -> OperatorConfig {
        OperatorConfig {
            repeat_threshold,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_runs_stages_until_drained() {
        let probe = CountingOperator::new(TaskType::Probe, 2);
        let html = CountingOperator::new(TaskType::Html, 1);
        let manager = TaskManager::new(vec![probe.clone(), html.clone()], None, config(10));

        let runs = manager.run_tasks().await;
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].task_type, TaskType::Probe);
        assert_eq!(runs[2].task_type, TaskType::Html);
        assert_eq!(manager.status(), ManagerStatus::Idle);
    }

    #[tokio::test]
    async fn test_repeat_threshold_moves_on() {
        let probe = CountingOperator::new(TaskType::Probe, 100);
        let html = CountingOperator::new(TaskType::Html, 1);
        let manager = TaskManager::new(vec![probe.clone(), html.clone()], None, config(3));

        manager.run_tasks().await;
        assert_eq!(probe.runs.load(Ordering::SeqCst), 3);
        assert_eq!(html.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_run_ends_stage_turn() {
        let broken = CountingOperator::failing(TaskType::Relevancy);
        let html = CountingOperator::new(TaskType::Html, 1);
        let manager = TaskManager::new(vec![broken.clone(), html.clone()], None, config(10));

        manager.run_tasks().await;
        assert_eq!(broken.runs.load(Ordering::SeqCst), 1);
        assert_eq!(html.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_task_by_type() {
        let probe = CountingOperator::new(TaskType::Probe, 5);
        let manager = TaskManager::new(vec![probe.clone()], None, config(10));

        let info = manager.run_task(TaskType::Probe, 10).await.unwrap();
        assert_eq!(info.processed, 1);
        let err = manager.run_task(TaskType::Submit, 10).await.unwrap_err();
        assert!(matches!(err, OperatorError::UnknownTask(TaskType::Submit)));
    }

    #[tokio::test]
    async fn test_overlapping_triggers_coalesce() {
        let probe = CountingOperator::new(TaskType::Probe, 1);
        let manager = TaskManager::new(vec![probe.clone()], None, config(10));

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.trigger_task_run().await })
        };
        while manager.status() == ManagerStatus::Idle && probe.runs.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        let mut rest = Vec::new();
        for _ in 0..5 {
            let manager = manager.clone();
            rest.push(tokio::spawn(async move { manager.trigger_task_run().await }));
        }
        first.await.unwrap();
        for handle in rest {
            handle.await.unwrap();
        }
        // The rerun finds nothing left to do.
        assert_eq!(probe.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ManagerStatus::Idle.to_string(), "idle");
        assert_eq!(
            ManagerStatus::Running(TaskType::Html).to_string(),
            "running html"
        );
    }
}
