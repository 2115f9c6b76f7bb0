//! Task data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::urls::UrlId;

/// Identifier of a task row.
pub type TaskId = i64;

/// The pipeline stage (or scheduled job) a task ran.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Probe,
    Html,
    Relevancy,
    RecordType,
    AgencyIdentification,
    MiscMetadata,
    Duplicate,
    Submit,
    Sync,
}

impl TaskType {
    pub const ALL: [TaskType; 9] = [
        TaskType::Probe,
        TaskType::Html,
        TaskType::Relevancy,
        TaskType::RecordType,
        TaskType::AgencyIdentification,
        TaskType::MiscMetadata,
        TaskType::Duplicate,
        TaskType::Submit,
        TaskType::Sync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Probe => "probe",
            TaskType::Html => "html",
            TaskType::Relevancy => "relevancy",
            TaskType::RecordType => "record_type",
            TaskType::AgencyIdentification => "agency_identification",
            TaskType::MiscMetadata => "misc_metadata",
            TaskType::Duplicate => "duplicate",
            TaskType::Submit => "submit",
            TaskType::Sync => "sync",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown task type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProcess,
    Complete,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::InProcess => "in_process",
            TaskStatus::Complete => "complete",
            TaskStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::InProcess)
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_process" => Ok(TaskStatus::InProcess),
            "complete" => Ok(TaskStatus::Complete),
            "error" => Ok(TaskStatus::Error),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// One entry of a task's append-only error log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskErrorEntry {
    pub id: i64,
    pub task_id: TaskId,
    /// URL the error concerns; None for task-level errors.
    pub url_id: Option<UrlId>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A recorded run of one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub url_ids: Vec<UrlId>,
    pub errors: Vec<TaskErrorEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_round_trip() {
        for t in TaskType::ALL {
            assert_eq!(t.as_str().parse::<TaskType>().unwrap(), t);
        }
    }

    #[test]
    fn test_task_status_terminal() {
        assert!(!TaskStatus::InProcess.is_terminal());
        assert!(TaskStatus::Complete.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
    }
}
