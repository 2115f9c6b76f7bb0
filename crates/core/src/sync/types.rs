use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A law enforcement or government agency known upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agency {
    pub id: i64,
    pub name: String,
    pub state: Option<String>,
    pub county: Option<String>,
    pub locality: Option<String>,
}

/// Resume point of a paged sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncState {
    /// One-based page to request next.
    pub next_page: u32,
    /// When the last full pass finished.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            next_page: 1,
            last_synced_at: None,
        }
    }
}
