//! Agency synchronisation from the upstream data-sources service.

mod operator;
mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::classifier::ClassifierError;
use crate::store::StoreError;

pub use operator::{AgencySyncOperator, AGENCY_SYNC};
pub use types::{Agency, SyncState};

/// Paged source of agencies.
#[async_trait]
pub trait AgencySource: Send + Sync {
    /// One page of agencies updated after `updated_since`, or all of them
    /// when it is `None`. An empty page ends the pass.
    async fn fetch_agencies(
        &self,
        page: u32,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Agency>, ClassifierError>;
}

pub trait AgencyStore: Send + Sync {
    /// Insert or update by id. Returns the number written.
    fn upsert_agencies(&self, agencies: &[Agency]) -> Result<usize, StoreError>;

    fn get_agency(&self, id: i64) -> Result<Option<Agency>, StoreError>;

    fn count_agencies(&self) -> Result<i64, StoreError>;

    /// Saved cursor for `name`, or a fresh one.
    fn sync_state(&self, name: &str) -> Result<SyncState, StoreError>;

    fn save_sync_state(&self, name: &str, state: &SyncState) -> Result<(), StoreError>;
}
