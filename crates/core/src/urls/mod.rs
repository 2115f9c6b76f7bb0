//! URLs, batches and the storage contract the lifecycle manager needs.

mod canonical;
mod store;
mod types;

pub use canonical::{canonicalize, resolve_location, root_url};
pub use store::{ArtifactStore, UrlFilter, UrlStore};
pub use types::*;
