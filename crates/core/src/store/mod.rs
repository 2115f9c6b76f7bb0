//! SQLite storage collaborator.
//!
//! Each domain module declares the storage trait it needs (`UrlStore`,
//! `AnnotationStore`, `TaskStore`, `RootCacheStore`, `AgencyStore`);
//! [`SqliteStore`] implements all of them over a single connection.

mod agencies;
mod annotations;
mod root_cache;
mod schema;
mod tasks;
mod urls;

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{ffi, Connection};
use thiserror::Error;

/// Errors from the storage collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    /// A unique index or primary key rejected the write.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A CHECK constraint or guard trigger rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, ref message) = e {
            if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                let detail = message.clone().unwrap_or_else(|| e.to_string());
                return match failure.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        StoreError::UniqueViolation(detail)
                    }
                    _ => StoreError::Constraint(detail),
                };
            }
        }
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }
}

// ============================================================================
// Row helpers
// ============================================================================

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a TEXT column holding an enum label.
fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|msg| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(msg),
        )
    })
}

/// Parse a TEXT column holding JSON.
fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_file_store_twice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("collector.db");
        {
            SqliteStore::new(&path).unwrap();
        }
        // Schema creation is idempotent.
        SqliteStore::new(&path).unwrap();
    }

    #[test]
    fn test_unique_violation_mapping() {
        let store = SqliteStore::in_memory().unwrap();
        let conn = store.conn().unwrap();
        conn.execute(
            "INSERT INTO root_url_cache (root_url, page_title, updated_at) VALUES ('https://a.gov', '', '')",
            [],
        )
        .unwrap();
        let err: StoreError = conn
            .execute(
                "INSERT INTO root_url_cache (root_url, page_title, updated_at) VALUES ('https://a.gov', '', '')",
                [],
            )
            .unwrap_err()
            .into();
        assert!(matches!(err, StoreError::UniqueViolation(_)), "{err:?}");
    }
}
