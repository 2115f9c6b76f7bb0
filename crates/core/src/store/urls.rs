//! `UrlStore` and `ArtifactStore` over SQLite.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::urls::{
    ArtifactStore, Batch, BatchCounts, BatchId, BatchStatus, CollectorType, DuplicateRecord,
    HtmlContent, InsertOutcome, NewUrl, UrlFilter, UrlId, UrlRecord, UrlStatus, UrlStore,
    WebMetadata,
};

use super::{now, parse_column, parse_json, parse_timestamp, SqliteStore, StoreError};

/// Column list matching [`row_to_url`]; `u` is urls, `b` is batches.
pub(super) const URL_COLUMNS: &str = "u.id, u.url, u.batch_id, b.strategy, u.status, u.name, \
     u.description, u.collector_metadata, u.created_at, u.updated_at";

pub(super) const URL_FROM: &str = "FROM urls u LEFT JOIN batches b ON b.id = u.batch_id";

pub(super) fn row_to_url(row: &Row) -> rusqlite::Result<UrlRecord> {
    let strategy: Option<String> = row.get(3)?;
    let status: String = row.get(4)?;
    let metadata: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(UrlRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        batch_id: row.get(2)?,
        collector_type: strategy
            .map(|s| parse_column::<CollectorType>(3, &s))
            .transpose()?,
        status: parse_column(4, &status)?,
        name: row.get(5)?,
        description: row.get(6)?,
        collector_metadata: parse_json(7, &metadata)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_batch(row: &Row) -> rusqlite::Result<Batch> {
    let strategy: String = row.get(1)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Batch {
        id: row.get(0)?,
        strategy: parse_column(1, &strategy)?,
        user_id: row.get(2)?,
        status: parse_column(3, &status)?,
        counts: BatchCounts {
            total: row.get(4)?,
            new: row.get(5)?,
            duplicate: row.get(6)?,
        },
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_duplicate(row: &Row) -> rusqlite::Result<DuplicateRecord> {
    let created_at: String = row.get(3)?;
    Ok(DuplicateRecord {
        id: row.get(0)?,
        original_url_id: row.get(1)?,
        batch_id: row.get(2)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn select_urls(
    conn: &Connection,
    predicate: &str,
    limit: usize,
) -> Result<Vec<UrlRecord>, StoreError> {
    let sql = format!("SELECT {URL_COLUMNS} {URL_FROM} WHERE {predicate} ORDER BY u.id LIMIT ?1");
    let mut stmt = conn.prepare(&sql)?;
    let urls = stmt
        .query_map(params![limit as i64], row_to_url)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(urls)
}

fn build_where_clause(filter: &UrlFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        conditions.push("u.status = ?");
        params.push(Box::new(status.as_str()));
    }

    if let Some(batch_id) = filter.batch_id {
        conditions.push("u.batch_id = ?");
        params.push(Box::new(batch_id));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, params)
}

impl UrlStore for SqliteStore {
    fn create_batch(&self, strategy: CollectorType, user_id: i64) -> Result<Batch, StoreError> {
        let conn = self.conn()?;
        let ts = now();
        conn.execute(
            "INSERT INTO batches (strategy, user_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![strategy.as_str(), user_id, BatchStatus::InProcess.as_str(), ts],
        )?;
        let id = conn.last_insert_rowid();
        let batch = conn.query_row(
            "SELECT id, strategy, user_id, status, total_urls, new_urls, duplicate_urls,
                    created_at, updated_at
             FROM batches WHERE id = ?1",
            params![id],
            row_to_batch,
        )?;
        Ok(batch)
    }

    fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        let conn = self.conn()?;
        let batch = conn
            .query_row(
                "SELECT id, strategy, user_id, status, total_urls, new_urls, duplicate_urls,
                        created_at, updated_at
                 FROM batches WHERE id = ?1",
                params![id],
                row_to_batch,
            )
            .optional()?;
        Ok(batch)
    }

    fn update_batch(
        &self,
        id: BatchId,
        status: BatchStatus,
        counts: Option<BatchCounts>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = match counts {
            Some(counts) => conn.execute(
                "UPDATE batches SET status = ?1, total_urls = ?2, new_urls = ?3,
                        duplicate_urls = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    status.as_str(),
                    counts.total,
                    counts.new,
                    counts.duplicate,
                    now(),
                    id
                ],
            )?,
            None => conn.execute(
                "UPDATE batches SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now(), id],
            )?,
        };
        if changed == 0 {
            return Err(StoreError::NotFound(format!("batch {id}")));
        }
        Ok(())
    }

    fn get_url(&self, id: UrlId) -> Result<Option<UrlRecord>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {URL_COLUMNS} {URL_FROM} WHERE u.id = ?1");
        Ok(conn.query_row(&sql, params![id], row_to_url).optional()?)
    }

    fn find_url(&self, canonical: &str) -> Result<Option<UrlRecord>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {URL_COLUMNS} {URL_FROM} WHERE u.url = ?1");
        Ok(conn
            .query_row(&sql, params![canonical], row_to_url)
            .optional()?)
    }

    fn insert_url_or_existing(&self, new_url: &NewUrl) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn()?;
        let ts = now();
        let metadata = serde_json::to_string(&new_url.collector_metadata)?;
        let inserted = conn.execute(
            "INSERT INTO urls (url, batch_id, status, collector_metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(url) DO NOTHING",
            params![
                new_url.url,
                new_url.batch_id,
                UrlStatus::Pending.as_str(),
                metadata,
                ts
            ],
        )?;
        if inserted == 1 {
            return Ok(InsertOutcome::Inserted(conn.last_insert_rowid()));
        }
        let existing: UrlId = conn.query_row(
            "SELECT id FROM urls WHERE url = ?1",
            params![new_url.url],
            |row| row.get(0),
        )?;
        Ok(InsertOutcome::Existing(existing))
    }

    fn list_urls(&self, filter: &UrlFilter) -> Result<Vec<UrlRecord>, StoreError> {
        let conn = self.conn()?;
        let (where_clause, mut params) = build_where_clause(filter);
        let sql = format!(
            "SELECT {URL_COLUMNS} {URL_FROM} {where_clause} ORDER BY u.id LIMIT ? OFFSET ?"
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let urls = stmt
            .query_map(param_refs.as_slice(), row_to_url)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls)
    }

    fn count_urls(&self, filter: &UrlFilter) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let (where_clause, params) = build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM urls u {where_clause}");
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn record_duplicate(
        &self,
        original_url_id: UrlId,
        batch_id: BatchId,
    ) -> Result<DuplicateRecord, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO duplicates (original_url_id, batch_id, created_at) VALUES (?1, ?2, ?3)",
            params![original_url_id, batch_id, now()],
        )?;
        let id = conn.last_insert_rowid();
        Ok(conn.query_row(
            "SELECT id, original_url_id, batch_id, created_at FROM duplicates WHERE id = ?1",
            params![id],
            row_to_duplicate,
        )?)
    }

    fn list_duplicates(&self, batch_id: BatchId) -> Result<Vec<DuplicateRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, original_url_id, batch_id, created_at FROM duplicates
             WHERE batch_id = ?1 ORDER BY id",
        )?;
        let records = stmt
            .query_map(params![batch_id], row_to_duplicate)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn update_status_if(
        &self,
        id: UrlId,
        expected: UrlStatus,
        new: UrlStatus,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE urls SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![new.as_str(), now(), id, expected.as_str()],
        )?;
        Ok(changed == 1)
    }

    fn update_url_details(
        &self,
        id: UrlId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE urls SET name = COALESCE(?1, name), description = COALESCE(?2, description),
                    updated_at = ?3
             WHERE id = ?4",
            params![name, description, now(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("url {id}")));
        }
        Ok(())
    }

    fn data_source_for(&self, id: UrlId) -> Result<Option<i64>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT data_source_id FROM url_data_sources WHERE url_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn link_data_source(&self, id: UrlId, data_source_id: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO url_data_sources (url_id, data_source_id, created_at) VALUES (?1, ?2, ?3)",
            params![id, data_source_id, now()],
        )?;
        Ok(())
    }

    fn reviewer_for(&self, id: UrlId) -> Result<Option<i64>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT user_id FROM url_reviewers WHERE url_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_reviewer(&self, id: UrlId, user_id: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO url_reviewers (url_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![id, user_id, now()],
        )?;
        Ok(())
    }

    fn revert_unnamed_validated(&self) -> Result<Vec<UrlId>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let ids = {
            let mut stmt = tx.prepare(
                "SELECT id FROM urls
                 WHERE status = 'validated' AND (name IS NULL OR TRIM(name) = '')
                 ORDER BY id",
            )?;
            let ids = stmt
                .query_map([], |row| row.get::<_, UrlId>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        let ts = now();
        for id in &ids {
            tx.execute(
                "UPDATE urls SET status = 'pending', updated_at = ?1
                 WHERE id = ?2 AND status = 'validated'",
                params![ts, id],
            )?;
        }
        tx.commit()?;
        Ok(ids)
    }
}

impl ArtifactStore for SqliteStore {
    fn urls_without_probe(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError> {
        let conn = self.conn()?;
        select_urls(
            &conn,
            "u.status = 'pending'
             AND NOT EXISTS (SELECT 1 FROM url_web_metadata m WHERE m.url_id = u.id)
             AND NOT EXISTS (SELECT 1 FROM url_redirects r WHERE r.source_url_id = u.id)",
            limit,
        )
    }

    fn record_web_metadata(&self, id: UrlId, metadata: &WebMetadata) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO url_web_metadata (url_id, status_code, content_type, error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(url_id) DO UPDATE SET
                status_code = excluded.status_code,
                content_type = excluded.content_type,
                error = excluded.error,
                updated_at = excluded.updated_at",
            params![
                id,
                metadata.status_code,
                metadata.content_type,
                metadata.error,
                now()
            ],
        )?;
        Ok(())
    }

    fn web_metadata(&self, id: UrlId) -> Result<Option<WebMetadata>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT status_code, content_type, error FROM url_web_metadata WHERE url_id = ?1",
                params![id],
                |row| {
                    Ok(WebMetadata {
                        status_code: row.get(0)?,
                        content_type: row.get(1)?,
                        error: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn record_redirect(&self, source: UrlId, destination: UrlId) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO url_redirects (source_url_id, destination_url_id, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(source_url_id) DO UPDATE SET destination_url_id = excluded.destination_url_id",
            params![source, destination, now()],
        )?;
        Ok(())
    }

    fn redirect_target(&self, source: UrlId) -> Result<Option<UrlId>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT destination_url_id FROM url_redirects WHERE source_url_id = ?1",
                params![source],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn urls_pending_html(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError> {
        let conn = self.conn()?;
        select_urls(
            &conn,
            "u.status = 'pending'
             AND EXISTS (SELECT 1 FROM url_web_metadata m
                         WHERE m.url_id = u.id AND m.status_code BETWEEN 200 AND 299)
             AND NOT EXISTS (SELECT 1 FROM url_html h WHERE h.url_id = u.id)",
            limit,
        )
    }

    fn store_html(&self, id: UrlId, content: &HtmlContent) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO url_html (url_id, html, title, description, h1, root_page_title, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(url_id) DO UPDATE SET
                html = excluded.html,
                title = excluded.title,
                description = excluded.description,
                h1 = excluded.h1,
                root_page_title = excluded.root_page_title",
            params![
                id,
                content.html,
                content.title,
                content.description,
                content.h1,
                content.root_page_title,
                now()
            ],
        )?;
        Ok(())
    }

    fn html_for(&self, id: UrlId) -> Result<Option<HtmlContent>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT html, title, description, h1, root_page_title FROM url_html WHERE url_id = ?1",
                params![id],
                |row| {
                    Ok(HtmlContent {
                        html: row.get(0)?,
                        title: row.get(1)?,
                        description: row.get(2)?,
                        h1: row.get(3)?,
                        root_page_title: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    fn urls_unchecked_for_duplicates(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError> {
        let conn = self.conn()?;
        select_urls(
            &conn,
            "u.status = 'pending'
             AND NOT EXISTS (SELECT 1 FROM url_duplicate_checks d WHERE d.url_id = u.id)",
            limit,
        )
    }

    fn mark_duplicate_checked(&self, id: UrlId, is_duplicate: bool) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO url_duplicate_checks (url_id, is_duplicate, checked_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(url_id) DO UPDATE SET
                is_duplicate = excluded.is_duplicate,
                checked_at = excluded.checked_at",
            params![id, is_duplicate, now()],
        )?;
        Ok(())
    }
}
