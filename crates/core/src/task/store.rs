//! Task storage trait.

use crate::store::StoreError;
use crate::urls::UrlId;

use super::{Task, TaskErrorEntry, TaskId, TaskStatus, TaskType};

/// Storage for task runs and their error logs.
pub trait TaskStore: Send + Sync {
    /// Create a task in `in_process` state.
    fn create_task(&self, task_type: TaskType) -> Result<Task, StoreError>;

    fn link_urls(&self, task_id: TaskId, url_ids: &[UrlId]) -> Result<(), StoreError>;

    /// Append to the error log. Existing entries are never modified.
    fn append_error(
        &self,
        task_id: TaskId,
        url_id: Option<UrlId>,
        message: &str,
    ) -> Result<TaskErrorEntry, StoreError>;

    fn finish_task(&self, task_id: TaskId, status: TaskStatus) -> Result<(), StoreError>;

    /// Task with its linked URLs and error log.
    fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, StoreError>;

    fn errors_for_url(&self, url_id: UrlId) -> Result<Vec<TaskErrorEntry>, StoreError>;
}
