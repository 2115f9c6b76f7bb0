//! URL and batch lifecycle.
//!
//! [`LifecycleManager`] is the only writer of URL and batch status. Stage
//! operators request transitions through it so invariants are checked in
//! one place.

mod batches;
mod error;
mod manager;

pub use batches::IngestSummary;
pub use error::LifecycleError;
pub use manager::{LifecycleManager, TransitionOutcome};
