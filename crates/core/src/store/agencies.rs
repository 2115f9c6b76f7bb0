//! `AgencyStore` over SQLite.

use rusqlite::{params, OptionalExtension, Row};

use crate::sync::{Agency, AgencyStore, SyncState};

use super::{now, parse_timestamp, SqliteStore, StoreError};

fn row_to_agency(row: &Row) -> rusqlite::Result<Agency> {
    Ok(Agency {
        id: row.get(0)?,
        name: row.get(1)?,
        state: row.get(2)?,
        county: row.get(3)?,
        locality: row.get(4)?,
    })
}

impl AgencyStore for SqliteStore {
    fn upsert_agencies(&self, agencies: &[Agency]) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let ts = now();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO agencies (id, name, state, county, locality, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    state = excluded.state,
                    county = excluded.county,
                    locality = excluded.locality,
                    updated_at = excluded.updated_at",
            )?;
            for agency in agencies {
                stmt.execute(params![
                    agency.id,
                    agency.name,
                    agency.state,
                    agency.county,
                    agency.locality,
                    ts
                ])?;
            }
        }
        tx.commit()?;
        Ok(agencies.len())
    }

    fn get_agency(&self, id: i64) -> Result<Option<Agency>, StoreError> {
        let conn = self.conn()?;
        let agency = conn
            .query_row(
                "SELECT id, name, state, county, locality FROM agencies WHERE id = ?1",
                params![id],
                row_to_agency,
            )
            .optional()?;
        Ok(agency)
    }

    fn count_agencies(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM agencies", [], |row| row.get(0))?;
        Ok(count)
    }

    fn sync_state(&self, name: &str) -> Result<SyncState, StoreError> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT next_page, last_synced_at FROM sync_state WHERE name = ?1",
                params![name],
                |row| {
                    let last: Option<String> = row.get(1)?;
                    Ok(SyncState {
                        next_page: row.get(0)?,
                        last_synced_at: last.as_deref().map(parse_timestamp),
                    })
                },
            )
            .optional()?;
        Ok(state.unwrap_or_default())
    }

    fn save_sync_state(&self, name: &str, state: &SyncState) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state (name, next_page, last_synced_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                next_page = excluded.next_page,
                last_synced_at = excluded.last_synced_at",
            params![
                name,
                state.next_page,
                state.last_synced_at.map(|t| t.to_rfc3339())
            ],
        )?;
        Ok(())
    }
}
