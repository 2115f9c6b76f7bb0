//! Batch registration and ingestion.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::dedup::{DedupError, Registration};
use crate::metrics::URLS_INGESTED;
use crate::store::StoreError;
use crate::urls::{Batch, BatchCounts, BatchId, BatchStatus, CollectedUrl, CollectorType, UrlId};

use super::{LifecycleError, LifecycleManager};

/// Result of ingesting one collection run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestSummary {
    pub batch_id: BatchId,
    pub created: Vec<UrlId>,
    /// Ids of the already-known URLs each duplicate sighting matched.
    pub duplicates: Vec<UrlId>,
    /// Raw strings rejected as unparseable.
    pub invalid: Vec<String>,
}

impl IngestSummary {
    pub fn counts(&self) -> BatchCounts {
        BatchCounts {
            total: (self.created.len() + self.duplicates.len() + self.invalid.len()) as u32,
            new: self.created.len() as u32,
            duplicate: self.duplicates.len() as u32,
        }
    }
}

impl LifecycleManager {
    pub fn register_batch(
        &self,
        strategy: CollectorType,
        user_id: i64,
    ) -> Result<Batch, LifecycleError> {
        let batch = self.urls.create_batch(strategy, user_id)?;
        info!(batch_id = batch.id, strategy = %strategy, user_id, "Registered batch");
        Ok(batch)
    }

    fn open_batch(&self, batch_id: BatchId) -> Result<Batch, LifecycleError> {
        let batch = self
            .urls
            .get_batch(batch_id)?
            .ok_or(LifecycleError::BatchNotFound(batch_id))?;
        if batch.status.is_finished() {
            return Err(LifecycleError::BatchFinished {
                id: batch_id,
                status: batch.status,
            });
        }
        Ok(batch)
    }

    /// Deduplicate and insert each collected URL, record batch counts and
    /// mark the batch complete.
    pub fn ingest(
        &self,
        batch_id: BatchId,
        collected: Vec<CollectedUrl>,
    ) -> Result<IngestSummary, LifecycleError> {
        self.open_batch(batch_id)?;

        let mut summary = IngestSummary {
            batch_id,
            ..Default::default()
        };
        for item in collected {
            match self.dedup.register(&item.url, Some(batch_id), item.metadata) {
                Ok(Registration::Created(id)) => {
                    URLS_INGESTED.with_label_values(&["new"]).inc();
                    summary.created.push(id);
                }
                Ok(Registration::Duplicate(id)) => {
                    URLS_INGESTED.with_label_values(&["duplicate"]).inc();
                    summary.duplicates.push(id);
                }
                Err(DedupError::InvalidUrl(raw)) => {
                    URLS_INGESTED.with_label_values(&["invalid"]).inc();
                    warn!(batch_id, url = %raw, "Skipping invalid URL");
                    summary.invalid.push(raw);
                }
                Err(DedupError::Store(e)) => {
                    self.fail_batch(batch_id, &e.to_string())?;
                    return Err(e.into());
                }
            }
        }

        self.urls
            .update_batch(batch_id, BatchStatus::Complete, Some(summary.counts()))?;
        info!(
            batch_id,
            new = summary.created.len(),
            duplicate = summary.duplicates.len(),
            invalid = summary.invalid.len(),
            "Batch ingested"
        );
        Ok(summary)
    }

    /// Stop an in-process batch.
    pub fn abort_batch(&self, batch_id: BatchId) -> Result<(), LifecycleError> {
        self.open_batch(batch_id)?;
        self.set_batch_status(batch_id, BatchStatus::Aborted)?;
        info!(batch_id, "Batch aborted");
        Ok(())
    }

    /// Mark a batch as failed, e.g. when its collector crashed.
    pub fn fail_batch(&self, batch_id: BatchId, reason: &str) -> Result<(), LifecycleError> {
        self.set_batch_status(batch_id, BatchStatus::Error)?;
        error!(batch_id, reason, "Batch failed");
        Ok(())
    }

    fn set_batch_status(&self, batch_id: BatchId, status: BatchStatus) -> Result<(), LifecycleError> {
        match self.urls.update_batch(batch_id, status, None) {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => Err(LifecycleError::BatchNotFound(batch_id)),
            Err(e) => Err(e.into()),
        }
    }
}
