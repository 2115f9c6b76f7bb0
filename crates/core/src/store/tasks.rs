//! `TaskStore` over SQLite.

use rusqlite::{params, OptionalExtension, Row};

use crate::task::{Task, TaskErrorEntry, TaskId, TaskStatus, TaskStore, TaskType};
use crate::urls::UrlId;

use super::{now, parse_column, parse_timestamp, SqliteStore, StoreError};

fn row_to_error(row: &Row) -> rusqlite::Result<TaskErrorEntry> {
    let created_at: String = row.get(4)?;
    Ok(TaskErrorEntry {
        id: row.get(0)?,
        task_id: row.get(1)?,
        url_id: row.get(2)?,
        message: row.get(3)?,
        created_at: parse_timestamp(&created_at),
    })
}

impl TaskStore for SqliteStore {
    fn create_task(&self, task_type: TaskType) -> Result<Task, StoreError> {
        let conn = self.conn()?;
        let ts = now();
        conn.execute(
            "INSERT INTO tasks (task_type, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![task_type.as_str(), TaskStatus::InProcess.as_str(), ts],
        )?;
        let created_at = parse_timestamp(&ts);
        Ok(Task {
            id: conn.last_insert_rowid(),
            task_type,
            status: TaskStatus::InProcess,
            url_ids: Vec::new(),
            errors: Vec::new(),
            created_at,
            updated_at: created_at,
        })
    }

    fn link_urls(&self, task_id: TaskId, url_ids: &[UrlId]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO task_urls (task_id, url_id) VALUES (?1, ?2)")?;
            for url_id in url_ids {
                stmt.execute(params![task_id, url_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn append_error(
        &self,
        task_id: TaskId,
        url_id: Option<UrlId>,
        message: &str,
    ) -> Result<TaskErrorEntry, StoreError> {
        let conn = self.conn()?;
        let ts = now();
        conn.execute(
            "INSERT INTO task_errors (task_id, url_id, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![task_id, url_id, message, ts],
        )?;
        Ok(TaskErrorEntry {
            id: conn.last_insert_rowid(),
            task_id,
            url_id,
            message: message.to_string(),
            created_at: parse_timestamp(&ts),
        })
    }

    fn finish_task(&self, task_id: TaskId, status: TaskStatus) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now(), task_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {task_id}")));
        }
        Ok(())
    }

    fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, StoreError> {
        let conn = self.conn()?;
        let header = conn
            .query_row(
                "SELECT task_type, status, created_at, updated_at FROM tasks WHERE id = ?1",
                params![task_id],
                |row| {
                    let task_type: String = row.get(0)?;
                    let status: String = row.get(1)?;
                    let created_at: String = row.get(2)?;
                    let updated_at: String = row.get(3)?;
                    Ok((
                        parse_column::<TaskType>(0, &task_type)?,
                        parse_column::<TaskStatus>(1, &status)?,
                        parse_timestamp(&created_at),
                        parse_timestamp(&updated_at),
                    ))
                },
            )
            .optional()?;
        let Some((task_type, status, created_at, updated_at)) = header else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT url_id FROM task_urls WHERE task_id = ?1 ORDER BY url_id")?;
        let url_ids = stmt
            .query_map(params![task_id], |row| row.get::<_, UrlId>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, task_id, url_id, message, created_at FROM task_errors
             WHERE task_id = ?1 ORDER BY id",
        )?;
        let errors = stmt
            .query_map(params![task_id], row_to_error)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Task {
            id: task_id,
            task_type,
            status,
            url_ids,
            errors,
            created_at,
            updated_at,
        }))
    }

    fn errors_for_url(&self, url_id: UrlId) -> Result<Vec<TaskErrorEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, task_id, url_id, message, created_at FROM task_errors
             WHERE url_id = ?1 ORDER BY id",
        )?;
        let errors = stmt
            .query_map(params![url_id], row_to_error)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(errors)
    }
}
