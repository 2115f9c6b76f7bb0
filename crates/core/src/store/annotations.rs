//! `AnnotationStore` over SQLite.

use rusqlite::{params, OptionalExtension, Row};

use crate::annotation::{Annotation, AnnotationKind, AnnotationOrigin, AnnotationStore, NewAnnotation};
use crate::urls::{HtmlContent, UrlId, UrlRecord};

use super::urls::{row_to_url, URL_COLUMNS, URL_FROM};
use super::{now, parse_column, parse_json, parse_timestamp, SqliteStore, StoreError};

const ANNOTATION_COLUMNS: &str = "id, url_id, value, validation_status, validation_source, \
     confidence, model_name, user_id, created_at, updated_at";

fn row_to_annotation(row: &Row) -> rusqlite::Result<Annotation> {
    let value: String = row.get(2)?;
    let validation_status: String = row.get(3)?;
    let validation_source: String = row.get(4)?;
    let confidence: Option<f64> = row.get(5)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Annotation {
        id: row.get(0)?,
        url_id: row.get(1)?,
        value: parse_json(2, &value)?,
        validation_status: parse_column(3, &validation_status)?,
        validation_source: parse_column(4, &validation_source)?,
        confidence: confidence.map(|c| c as f32),
        model_name: row.get(6)?,
        user_id: row.get(7)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

impl AnnotationStore for SqliteStore {
    fn upsert_annotation(&self, annotation: &NewAnnotation) -> Result<Annotation, StoreError> {
        let conn = self.conn()?;
        let kind = annotation.value.kind();
        let origin = annotation.validation_source.origin();
        let value = serde_json::to_string(&annotation.value)?;
        let ts = now();

        conn.execute(
            "INSERT INTO annotations (url_id, kind, origin, value, validation_status,
                    validation_source, confidence, model_name, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(url_id, kind, origin) DO UPDATE SET
                value = excluded.value,
                validation_status = excluded.validation_status,
                validation_source = excluded.validation_source,
                confidence = excluded.confidence,
                model_name = excluded.model_name,
                user_id = excluded.user_id,
                updated_at = excluded.updated_at",
            params![
                annotation.url_id,
                kind.as_str(),
                origin.as_str(),
                value,
                annotation.validation_status.as_str(),
                annotation.validation_source.as_str(),
                annotation.confidence.map(f64::from),
                annotation.model_name,
                annotation.user_id,
                ts
            ],
        )?;

        let sql = format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotations
             WHERE url_id = ?1 AND kind = ?2 AND origin = ?3"
        );
        Ok(conn.query_row(
            &sql,
            params![annotation.url_id, kind.as_str(), origin.as_str()],
            row_to_annotation,
        )?)
    }

    fn get_annotation(
        &self,
        url_id: UrlId,
        kind: AnnotationKind,
        origin: AnnotationOrigin,
    ) -> Result<Option<Annotation>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotations
             WHERE url_id = ?1 AND kind = ?2 AND origin = ?3"
        );
        Ok(conn
            .query_row(
                &sql,
                params![url_id, kind.as_str(), origin.as_str()],
                row_to_annotation,
            )
            .optional()?)
    }

    fn annotations_for(&self, url_id: UrlId) -> Result<Vec<Annotation>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE url_id = ?1 ORDER BY kind, origin"
        );
        let mut stmt = conn.prepare(&sql)?;
        let annotations = stmt
            .query_map(params![url_id], row_to_annotation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(annotations)
    }

    fn urls_with_html_missing_auto(
        &self,
        kind: AnnotationKind,
        limit: usize,
    ) -> Result<Vec<(UrlRecord, HtmlContent)>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {URL_COLUMNS}, h.html, h.title, h.description, h.h1, h.root_page_title
             {URL_FROM}
             JOIN url_html h ON h.url_id = u.id
             WHERE u.status = 'pending'
               AND NOT EXISTS (SELECT 1 FROM annotations a
                               WHERE a.url_id = u.id AND a.kind = ?1 AND a.origin = 'auto')
             ORDER BY u.id
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![kind.as_str(), limit as i64], |row| {
                let url = row_to_url(row)?;
                let html = HtmlContent {
                    html: row.get(10)?,
                    title: row.get(11)?,
                    description: row.get(12)?,
                    h1: row.get(13)?,
                    root_page_title: row.get(14)?,
                };
                Ok((url, html))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn pending_urls_missing_auto(
        &self,
        kind: AnnotationKind,
        limit: usize,
    ) -> Result<Vec<UrlRecord>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {URL_COLUMNS} {URL_FROM}
             WHERE u.status = 'pending'
               AND NOT EXISTS (SELECT 1 FROM annotations a
                               WHERE a.url_id = u.id AND a.kind = ?1 AND a.origin = 'auto')
             ORDER BY u.id
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let urls = stmt
            .query_map(params![kind.as_str(), limit as i64], row_to_url)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls)
    }
}
