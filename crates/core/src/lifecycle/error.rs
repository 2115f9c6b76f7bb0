use thiserror::Error;

use crate::dedup::DedupError;
use crate::store::StoreError;
use crate::urls::{BatchId, BatchStatus, UrlId, UrlStatus};

/// Errors from lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("URL not found: {0}")]
    UrlNotFound(UrlId),

    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("batch {id} is already {status}")]
    BatchFinished { id: BatchId, status: BatchStatus },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: UrlStatus, to: UrlStatus },

    #[error("URL {0} is submitted with a linked data source")]
    DataSourceLinked(UrlId),

    #[error("URL {url_id} already has reviewer {reviewer}")]
    ReviewerAlreadyAssigned { url_id: UrlId, reviewer: i64 },

    #[error("status of URL {0} kept changing; gave up")]
    Conflict(UrlId),

    #[error("invalid URL: {0:?}")]
    InvalidUrl(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DedupError> for LifecycleError {
    fn from(e: DedupError) -> Self {
        match e {
            DedupError::InvalidUrl(url) => LifecycleError::InvalidUrl(url),
            DedupError::Store(e) => LifecycleError::Store(e),
        }
    }
}

impl LifecycleError {
    /// Storage failures abort a whole task run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LifecycleError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LifecycleError::InvalidTransition {
            from: UrlStatus::Approved,
            to: UrlStatus::Pending,
        };
        assert_eq!(err.to_string(), "invalid transition from approved to pending");

        let err = LifecycleError::BatchFinished {
            id: 4,
            status: BatchStatus::Aborted,
        };
        assert_eq!(err.to_string(), "batch 4 is already aborted");
    }

    #[test]
    fn test_only_store_errors_are_fatal() {
        assert!(LifecycleError::Store(StoreError::Database("gone".into())).is_fatal());
        assert!(!LifecycleError::UrlNotFound(1).is_fatal());
        assert!(!LifecycleError::from(DedupError::InvalidUrl("x".into())).is_fatal());
    }
}
