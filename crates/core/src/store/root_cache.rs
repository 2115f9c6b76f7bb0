//! `RootCacheStore` over SQLite.

use rusqlite::{params, OptionalExtension, Row};

use crate::root_cache::{RootCacheEntry, RootCacheStore};

use super::{now, parse_timestamp, SqliteStore, StoreError};

const ENTRY_COLUMNS: &str = "root_url, page_title, page_description, updated_at";

fn row_to_entry(row: &Row) -> rusqlite::Result<RootCacheEntry> {
    let updated_at: String = row.get(3)?;
    Ok(RootCacheEntry {
        root_url: row.get(0)?,
        page_title: row.get(1)?,
        page_description: row.get(2)?,
        updated_at: parse_timestamp(&updated_at),
    })
}

impl RootCacheStore for SqliteStore {
    fn load_root_cache(&self) -> Result<Vec<RootCacheEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM root_url_cache ORDER BY root_url"
        ))?;
        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn get_root_cache(&self, root_url: &str) -> Result<Option<RootCacheEntry>, StoreError> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM root_url_cache WHERE root_url = ?1"),
                params![root_url],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn upsert_root_cache(
        &self,
        root_url: &str,
        page_title: &str,
        page_description: Option<&str>,
    ) -> Result<RootCacheEntry, StoreError> {
        let conn = self.conn()?;
        let ts = now();
        conn.execute(
            "INSERT INTO root_url_cache (root_url, page_title, page_description, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(root_url) DO UPDATE SET
                page_title = excluded.page_title,
                page_description = excluded.page_description,
                updated_at = excluded.updated_at",
            params![root_url, page_title, page_description, ts],
        )?;
        Ok(RootCacheEntry {
            root_url: root_url.to_string(),
            page_title: page_title.to_string(),
            page_description: page_description.map(str::to_string),
            updated_at: parse_timestamp(&ts),
        })
    }
}
