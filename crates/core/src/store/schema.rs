//! Table definitions.

use rusqlite::Connection;

use super::StoreError;

pub(super) fn initialize(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            strategy TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            total_urls INTEGER NOT NULL DEFAULT 0,
            new_urls INTEGER NOT NULL DEFAULT 0,
            duplicate_urls INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS urls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            batch_id INTEGER REFERENCES batches(id),
            status TEXT NOT NULL DEFAULT 'pending',
            name TEXT,
            description TEXT,
            collector_metadata TEXT NOT NULL DEFAULT 'null',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_urls_status ON urls(status);
        CREATE INDEX IF NOT EXISTS idx_urls_batch ON urls(batch_id);

        CREATE TABLE IF NOT EXISTS duplicates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            original_url_id INTEGER NOT NULL REFERENCES urls(id),
            batch_id INTEGER NOT NULL REFERENCES batches(id),
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_duplicates_batch ON duplicates(batch_id);

        CREATE TABLE IF NOT EXISTS url_data_sources (
            url_id INTEGER PRIMARY KEY REFERENCES urls(id),
            data_source_id INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS url_reviewers (
            url_id INTEGER PRIMARY KEY REFERENCES urls(id),
            user_id INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS url_web_metadata (
            url_id INTEGER PRIMARY KEY REFERENCES urls(id),
            status_code INTEGER,
            content_type TEXT,
            error TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS url_redirects (
            source_url_id INTEGER PRIMARY KEY REFERENCES urls(id),
            destination_url_id INTEGER NOT NULL REFERENCES urls(id),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS url_html (
            url_id INTEGER PRIMARY KEY REFERENCES urls(id),
            html TEXT NOT NULL,
            title TEXT,
            description TEXT,
            h1 TEXT,
            root_page_title TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS url_duplicate_checks (
            url_id INTEGER PRIMARY KEY REFERENCES urls(id),
            is_duplicate INTEGER NOT NULL,
            checked_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS annotations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url_id INTEGER NOT NULL REFERENCES urls(id),
            kind TEXT NOT NULL,
            origin TEXT NOT NULL,
            value TEXT NOT NULL,
            validation_status TEXT NOT NULL,
            validation_source TEXT NOT NULL,
            confidence REAL,
            model_name TEXT,
            user_id INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (url_id, kind, origin)
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_type TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS task_urls (
            task_id INTEGER NOT NULL REFERENCES tasks(id),
            url_id INTEGER NOT NULL REFERENCES urls(id),
            PRIMARY KEY (task_id, url_id)
        );

        CREATE TABLE IF NOT EXISTS task_errors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL REFERENCES tasks(id),
            url_id INTEGER REFERENCES urls(id),
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_task_errors_url ON task_errors(url_id);

        CREATE TABLE IF NOT EXISTS root_url_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            root_url TEXT NOT NULL UNIQUE,
            page_title TEXT NOT NULL,
            page_description TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agencies (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            state TEXT,
            county TEXT,
            locality TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_state (
            name TEXT PRIMARY KEY,
            next_page INTEGER NOT NULL DEFAULT 1,
            last_synced_at TEXT
        );

        -- Task error log is append-only.
        CREATE TRIGGER IF NOT EXISTS task_errors_no_update
        BEFORE UPDATE ON task_errors
        BEGIN
            SELECT RAISE(ABORT, 'task errors are append-only');
        END;

        -- Submitted URLs with a linked data source cannot be moved back.
        CREATE TRIGGER IF NOT EXISTS urls_submitted_data_source_guard
        BEFORE UPDATE OF status ON urls
        WHEN OLD.status = 'submitted'
            AND NEW.status IN ('pending', 'error', 'duplicate', 'validated')
            AND EXISTS (SELECT 1 FROM url_data_sources WHERE url_id = OLD.id)
        BEGIN
            SELECT RAISE(ABORT, 'submitted URL has a linked data source');
        END;
        "#,
    )?;

    Ok(())
}
