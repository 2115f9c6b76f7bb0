//! Storage traits for URLs, batches and per-stage artifacts.

use crate::store::StoreError;

use super::{
    Batch, BatchCounts, BatchId, BatchStatus, CollectorType, DuplicateRecord, HtmlContent,
    InsertOutcome, NewUrl, UrlId, UrlRecord, UrlStatus, WebMetadata,
};

/// Filter for listing URLs.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    pub status: Option<UrlStatus>,
    pub batch_id: Option<BatchId>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl UrlFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            batch_id: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: UrlStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_batch(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// URL and batch rows. Only the lifecycle manager writes URL status.
pub trait UrlStore: Send + Sync {
    /// Create a new batch in `in-process` state.
    fn create_batch(&self, strategy: CollectorType, user_id: i64) -> Result<Batch, StoreError>;

    fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError>;

    /// Set a batch's status, recording URL counts when given.
    fn update_batch(
        &self,
        id: BatchId,
        status: BatchStatus,
        counts: Option<BatchCounts>,
    ) -> Result<(), StoreError>;

    fn get_url(&self, id: UrlId) -> Result<Option<UrlRecord>, StoreError>;

    /// Look up a URL by its canonical string.
    fn find_url(&self, canonical: &str) -> Result<Option<UrlRecord>, StoreError>;

    /// Insert a URL, or report the id of the row already holding that
    /// canonical string. Atomic with respect to concurrent inserts.
    fn insert_url_or_existing(&self, new_url: &NewUrl) -> Result<InsertOutcome, StoreError>;

    fn list_urls(&self, filter: &UrlFilter) -> Result<Vec<UrlRecord>, StoreError>;

    fn count_urls(&self, filter: &UrlFilter) -> Result<i64, StoreError>;

    /// Record that `batch_id` sighted the already-known `original_url_id`.
    fn record_duplicate(
        &self,
        original_url_id: UrlId,
        batch_id: BatchId,
    ) -> Result<DuplicateRecord, StoreError>;

    fn list_duplicates(&self, batch_id: BatchId) -> Result<Vec<DuplicateRecord>, StoreError>;

    /// Set status to `new` only if it is currently `expected`.
    /// Returns false when the current status did not match.
    fn update_status_if(
        &self,
        id: UrlId,
        expected: UrlStatus,
        new: UrlStatus,
    ) -> Result<bool, StoreError>;

    /// Overwrite name and/or description; `None` leaves a field untouched.
    fn update_url_details(
        &self,
        id: UrlId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StoreError>;

    /// External data source linked to this URL, if any.
    fn data_source_for(&self, id: UrlId) -> Result<Option<i64>, StoreError>;

    fn link_data_source(&self, id: UrlId, data_source_id: i64) -> Result<(), StoreError>;

    fn reviewer_for(&self, id: UrlId) -> Result<Option<i64>, StoreError>;

    /// Fails with `UniqueViolation` if a reviewer is already recorded.
    fn set_reviewer(&self, id: UrlId, user_id: i64) -> Result<(), StoreError>;

    /// Move every `validated` URL without a name back to `pending`.
    /// Returns the affected ids.
    fn revert_unnamed_validated(&self) -> Result<Vec<UrlId>, StoreError>;
}

/// Per-stage artifacts attached to URLs, plus the eligibility queries the
/// URL-bound stages pull their work from.
pub trait ArtifactStore: Send + Sync {
    /// Pending URLs with neither web metadata nor a redirect record.
    fn urls_without_probe(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError>;

    fn record_web_metadata(&self, id: UrlId, metadata: &WebMetadata) -> Result<(), StoreError>;

    fn web_metadata(&self, id: UrlId) -> Result<Option<WebMetadata>, StoreError>;

    fn record_redirect(&self, source: UrlId, destination: UrlId) -> Result<(), StoreError>;

    fn redirect_target(&self, source: UrlId) -> Result<Option<UrlId>, StoreError>;

    /// Pending URLs probed with a 2xx response and no stored HTML.
    fn urls_pending_html(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError>;

    fn store_html(&self, id: UrlId, content: &HtmlContent) -> Result<(), StoreError>;

    fn html_for(&self, id: UrlId) -> Result<Option<HtmlContent>, StoreError>;

    /// Pending URLs that have not been checked against upstream sources.
    fn urls_unchecked_for_duplicates(&self, limit: usize) -> Result<Vec<UrlRecord>, StoreError>;

    fn mark_duplicate_checked(&self, id: UrlId, is_duplicate: bool) -> Result<(), StoreError>;
}
