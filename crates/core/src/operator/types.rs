//! Run summaries and error types for task operators.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::fetch::FetchError;
use crate::lifecycle::LifecycleError;
use crate::store::StoreError;
use crate::subtask::SubtaskError;
use crate::task::{TaskId, TaskType};
use crate::urls::UrlId;

/// Summary of one task run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunInfo {
    /// `None` when nothing was eligible and no task was created.
    pub task_id: Option<TaskId>,
    pub task_type: TaskType,
    /// Items whose outcome was applied, successful or not.
    pub processed: usize,
    pub succeeded: usize,
    pub errored: usize,
    /// Items still in flight when the run timed out or was aborted.
    pub abandoned: usize,
    pub timed_out: bool,
    /// Stopped early after too many item failures.
    pub aborted: bool,
    pub duration: Duration,
    pub url_ids: Vec<UrlId>,
}

impl RunInfo {
    pub(crate) fn empty(task_type: TaskType, duration: Duration) -> Self {
        Self {
            task_id: None,
            task_type,
            processed: 0,
            succeeded: 0,
            errored: 0,
            abandoned: 0,
            timed_out: false,
            aborted: false,
            duration,
            url_ids: Vec::new(),
        }
    }

    pub(crate) fn started(task_id: TaskId, task_type: TaskType, url_ids: Vec<UrlId>) -> Self {
        Self {
            task_id: Some(task_id),
            url_ids,
            ..Self::empty(task_type, Duration::ZERO)
        }
    }

    /// Whether the run had nothing to do.
    pub fn is_empty(&self) -> bool {
        self.task_id.is_none()
    }

    /// Label for metrics and logs.
    pub fn result_label(&self) -> &'static str {
        if self.timed_out {
            "timed_out"
        } else if self.aborted {
            "aborted"
        } else if self.task_id.is_none() {
            "empty"
        } else {
            "complete"
        }
    }
}

/// Whole-run failures. The remaining items of the batch are abandoned.
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("{task_type} task failed: {message}")]
    Fatal { task_type: TaskType, message: String },

    #[error("no operator registered for {0} tasks")]
    UnknownTask(TaskType),
}

/// Outcome of processing one item.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    /// Worth another attempt after a backoff.
    #[error("{0}")]
    Retryable(String),

    /// The item is marked `error`; the run continues.
    #[error("{0}")]
    Permanent(String),

    /// The run stops.
    #[error("{0}")]
    Fatal(String),
}

impl From<ClassifierError> for StageError {
    fn from(e: ClassifierError) -> Self {
        if e.is_transient() {
            StageError::Retryable(e.to_string())
        } else {
            StageError::Permanent(e.to_string())
        }
    }
}

impl From<FetchError> for StageError {
    fn from(e: FetchError) -> Self {
        if e.is_transient() {
            StageError::Retryable(e.to_string())
        } else {
            StageError::Permanent(e.to_string())
        }
    }
}

impl From<StoreError> for StageError {
    fn from(e: StoreError) -> Self {
        StageError::Fatal(e.to_string())
    }
}

impl From<LifecycleError> for StageError {
    fn from(e: LifecycleError) -> Self {
        if e.is_fatal() {
            StageError::Fatal(e.to_string())
        } else {
            StageError::Permanent(e.to_string())
        }
    }
}

impl From<SubtaskError> for StageError {
    fn from(e: SubtaskError) -> Self {
        StageError::Permanent(e.to_string())
    }
}
