//! External classifier collaborators.
//!
//! The stages only see these traits. Errors are split into transient
//! (worth retrying) and permanent failures; neither is ever replaced by a
//! silent default value.

mod http;
mod types;

use async_trait::async_trait;

use crate::urls::UrlRecord;

pub use http::HttpClassifier;
pub use types::{
    AgencySuggestion, ClassifierError, ClassifierInput, DataSourceSubmission, RecordTypeVerdict,
    RelevanceVerdict,
};

/// Decides whether a page is relevant to police data.
#[async_trait]
pub trait RelevanceClassifier: Send + Sync {
    async fn classify_relevance(
        &self,
        input: &ClassifierInput,
    ) -> Result<RelevanceVerdict, ClassifierError>;
}

/// Assigns a record type. Batched: one verdict per input, in order.
#[async_trait]
pub trait RecordTypeClassifier: Send + Sync {
    async fn classify_record_types(
        &self,
        inputs: &[ClassifierInput],
    ) -> Result<Vec<RecordTypeVerdict>, ClassifierError>;
}

/// Suggests agencies responsible for a URL.
#[async_trait]
pub trait AgencyIdentifier: Send + Sync {
    async fn identify_agencies(
        &self,
        url: &UrlRecord,
    ) -> Result<Vec<AgencySuggestion>, ClassifierError>;
}

/// Checks whether a URL is already registered upstream.
#[async_trait]
pub trait DuplicateChecker: Send + Sync {
    async fn is_duplicate(&self, url: &str) -> Result<bool, ClassifierError>;
}

/// Registers a validated URL as a data source. Returns the data source id.
#[async_trait]
pub trait DataSourceRegistrar: Send + Sync {
    async fn register(&self, submission: &DataSourceSubmission) -> Result<i64, ClassifierError>;
}
