//! Task records: one per stage run, with linked URLs and an error log.

mod store;
mod types;

pub use store::TaskStore;
pub use types::*;
