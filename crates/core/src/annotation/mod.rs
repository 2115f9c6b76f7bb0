//! Per-URL annotations produced by pipeline stages and reviewers.

mod store;
mod types;

pub use store::AnnotationStore;
pub use types::*;
