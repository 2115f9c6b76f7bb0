//! Duplicate detection at ingestion time.
//!
//! The unique index on the canonical URL string is the final arbiter: the
//! read-check here is an optimisation, and a lost insert race resolves to
//! the row that won it.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::store::StoreError;
use crate::urls::{
    canonicalize, root_url, BatchId, InsertOutcome, NewUrl, UrlId, UrlStore,
};

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("invalid URL: {0:?}")]
    InvalidUrl(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a read-only duplicate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    /// An existing URL has the same canonical form.
    Duplicate { original_url_id: UrlId },
    /// No match; the caller may create a row keyed by `canonical`.
    Distinct { canonical: String },
}

/// Result of registering a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created(UrlId),
    /// Already known under this id; no row was created.
    Duplicate(UrlId),
}

impl Registration {
    pub fn url_id(&self) -> UrlId {
        match self {
            Registration::Created(id) | Registration::Duplicate(id) => *id,
        }
    }
}

#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn UrlStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn UrlStore>) -> Self {
        Self { store }
    }

    /// Canonicalize and reject strings that cannot be a URL.
    pub fn canonical(raw: &str) -> Result<String, DedupError> {
        let canonical = canonicalize(raw.trim_start());
        if canonical.is_empty() || root_url(&canonical).is_none() {
            return Err(DedupError::InvalidUrl(raw.to_string()));
        }
        Ok(canonical)
    }

    /// Check whether `raw` is already known. When it is and `batch_id` is
    /// given, the sighting is recorded as a duplicate of that batch.
    pub fn check(&self, raw: &str, batch_id: Option<BatchId>) -> Result<DedupDecision, DedupError> {
        let canonical = Self::canonical(raw)?;
        match self.store.find_url(&canonical)? {
            Some(existing) => {
                if let Some(batch_id) = batch_id {
                    self.store.record_duplicate(existing.id, batch_id)?;
                }
                Ok(DedupDecision::Duplicate {
                    original_url_id: existing.id,
                })
            }
            None => Ok(DedupDecision::Distinct { canonical }),
        }
    }

    /// Create the URL unless it is already known. Duplicate sightings are
    /// recorded against `batch_id` when one is given.
    pub fn register(
        &self,
        raw: &str,
        batch_id: Option<BatchId>,
        metadata: serde_json::Value,
    ) -> Result<Registration, DedupError> {
        let registration = self.resolve(raw, batch_id, metadata)?;
        if let (Registration::Duplicate(original), Some(batch_id)) = (registration, batch_id) {
            self.store.record_duplicate(original, batch_id)?;
        }
        Ok(registration)
    }

    /// Like [`register`](Self::register) but never writes a duplicate
    /// record. Used for URLs discovered while processing, such as redirect
    /// targets.
    pub fn resolve(
        &self,
        raw: &str,
        batch_id: Option<BatchId>,
        metadata: serde_json::Value,
    ) -> Result<Registration, DedupError> {
        let canonical = Self::canonical(raw)?;

        if let Some(existing) = self.store.find_url(&canonical)? {
            return Ok(Registration::Duplicate(existing.id));
        }

        let new_url = NewUrl {
            url: canonical.clone(),
            batch_id,
            collector_metadata: metadata,
        };
        match self.store.insert_url_or_existing(&new_url) {
            Ok(InsertOutcome::Inserted(id)) => Ok(Registration::Created(id)),
            Ok(InsertOutcome::Existing(id)) => {
                debug!(url = %canonical, url_id = id, "Lost insert race, treating as duplicate");
                Ok(Registration::Duplicate(id))
            }
            Err(StoreError::UniqueViolation(_)) => {
                let existing = self.store.find_url(&canonical)?.ok_or_else(|| {
                    StoreError::NotFound(format!("url {canonical} after unique violation"))
                })?;
                Ok(Registration::Duplicate(existing.id))
            }
            Err(e) => Err(e.into()),
        }
    }
}
