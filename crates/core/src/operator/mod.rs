//! Task operators: one per pipeline stage.
//!
//! A stage implements [`StageProcessor`] (what is eligible, how one item is
//! processed, how a result is committed). [`TaskOperator`] supplies the
//! rest: task bookkeeping, bounded concurrency, retry with backoff, the
//! batch deadline and per-item error handling.

mod agency;
mod config;
mod duplicate;
mod harness;
mod html;
mod misc_metadata;
mod probe;
mod record_type;
mod relevancy;
mod submit;
mod types;

pub use agency::AgencyStage;
pub use config::{OperatorConfig, MAX_BATCH_TIMEOUT_SECS};
pub use duplicate::DuplicateStage;
pub use harness::{Operator, StageProcessor, TaskOperator};
pub use html::HtmlStage;
pub use misc_metadata::MiscMetadataStage;
pub use probe::{ProbeOutcome, ProbeStage};
pub use record_type::RecordTypeStage;
pub use relevancy::RelevancyStage;
pub use submit::SubmitStage;
pub use types::{OperatorError, RunInfo, StageError};
