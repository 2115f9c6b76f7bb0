//! URL and batch data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a URL row.
pub type UrlId = i64;

/// Identifier of a batch row.
pub type BatchId = i64;

// ============================================================================
// URL status
// ============================================================================

/// Lifecycle status of a URL.
///
/// ```text
/// pending ──► submitted ──► human_labeling ──► approved / rejected
///    │            │
///    │            ├──► approved / rejected
///    ├──► duplicate / error
///    └──► validated ──► submitted
/// ```
///
/// `validated` additionally requires the URL to carry a name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    /// Ingested, still moving through annotation stages.
    Pending,
    /// Registered as an external data source.
    Submitted,
    /// Waiting on further human labeling.
    HumanLabeling,
    /// Approved by a reviewer.
    Approved,
    /// Rejected by a reviewer.
    Rejected,
    /// Matched an already-known URL.
    Duplicate,
    /// A stage failed for this URL.
    Error,
    /// Annotations confirmed; ready for submission.
    Validated,
}

impl UrlStatus {
    /// All statuses, in declaration order.
    pub const ALL: [UrlStatus; 8] = [
        UrlStatus::Pending,
        UrlStatus::Submitted,
        UrlStatus::HumanLabeling,
        UrlStatus::Approved,
        UrlStatus::Rejected,
        UrlStatus::Duplicate,
        UrlStatus::Error,
        UrlStatus::Validated,
    ];

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Pending => "pending",
            UrlStatus::Submitted => "submitted",
            UrlStatus::HumanLabeling => "human_labeling",
            UrlStatus::Approved => "approved",
            UrlStatus::Rejected => "rejected",
            UrlStatus::Duplicate => "duplicate",
            UrlStatus::Error => "error",
            UrlStatus::Validated => "validated",
        }
    }

    /// Returns true if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UrlStatus::Approved | UrlStatus::Rejected | UrlStatus::Duplicate
        )
    }

    /// Returns true if moving to `target` lowers a submitted URL back out
    /// of its registered state.
    pub fn is_downgrade_from_submitted(target: UrlStatus) -> bool {
        matches!(
            target,
            UrlStatus::Pending | UrlStatus::Error | UrlStatus::Duplicate | UrlStatus::Validated
        )
    }

    /// Whether the state machine allows `self -> target`.
    pub fn can_transition_to(&self, target: UrlStatus) -> bool {
        use UrlStatus::*;
        match self {
            Pending => matches!(target, Submitted | Duplicate | Error | Validated),
            Submitted => matches!(
                target,
                HumanLabeling | Approved | Rejected | Duplicate | Error | Pending | Validated
            ),
            HumanLabeling => matches!(target, Approved | Rejected),
            Validated => matches!(target, Submitted | Pending | Duplicate | Error),
            Error => matches!(target, Pending),
            Approved | Rejected | Duplicate => false,
        }
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrlStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UrlStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown url status: {}", s))
    }
}

// ============================================================================
// Collector type
// ============================================================================

/// The upstream source that produced a batch of URLs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CollectorType {
    Example,
    AutoGoogler,
    CommonCrawler,
    MuckrockSimpleSearch,
    MuckrockCountySearch,
    MuckrockAllSearch,
    Ckan,
    Manual,
}

impl CollectorType {
    pub const ALL: [CollectorType; 8] = [
        CollectorType::Example,
        CollectorType::AutoGoogler,
        CollectorType::CommonCrawler,
        CollectorType::MuckrockSimpleSearch,
        CollectorType::MuckrockCountySearch,
        CollectorType::MuckrockAllSearch,
        CollectorType::Ckan,
        CollectorType::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorType::Example => "example",
            CollectorType::AutoGoogler => "auto_googler",
            CollectorType::CommonCrawler => "common_crawler",
            CollectorType::MuckrockSimpleSearch => "muckrock_simple_search",
            CollectorType::MuckrockCountySearch => "muckrock_county_search",
            CollectorType::MuckrockAllSearch => "muckrock_all_search",
            CollectorType::Ckan => "ckan",
            CollectorType::Manual => "manual",
        }
    }
}

impl fmt::Display for CollectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectorType::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown collector type: {}", s))
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Status of an ingestion batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BatchStatus {
    #[serde(rename = "in-process")]
    InProcess,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "aborted")]
    Aborted,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::InProcess => "in-process",
            BatchStatus::Complete => "complete",
            BatchStatus::Error => "error",
            BatchStatus::Aborted => "aborted",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, BatchStatus::InProcess)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-process" => Ok(BatchStatus::InProcess),
            "complete" => Ok(BatchStatus::Complete),
            "error" => Ok(BatchStatus::Error),
            "aborted" => Ok(BatchStatus::Aborted),
            other => Err(format!("unknown batch status: {}", other)),
        }
    }
}

/// URL counts recorded on a batch once ingestion finishes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchCounts {
    /// URLs submitted by the collector.
    pub total: u32,
    /// URLs that produced a new row.
    pub new: u32,
    /// URLs matched to an existing row.
    pub duplicate: u32,
}

/// A group of URLs ingested together from one collection run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Batch {
    pub id: BatchId,
    /// Collector that produced this batch.
    pub strategy: CollectorType,
    /// User that started the collection run.
    pub user_id: i64,
    pub status: BatchStatus,
    pub counts: BatchCounts,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// Share of submitted URLs that were new, if any were submitted.
    pub fn success_rate(&self) -> Option<f64> {
        if self.counts.total == 0 {
            None
        } else {
            Some(self.counts.new as f64 / self.counts.total as f64)
        }
    }
}

// ============================================================================
// URL
// ============================================================================

/// A URL row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UrlRecord {
    pub id: UrlId,
    /// Canonical URL string (unique).
    pub url: String,
    /// Batch that first sighted this URL. None for URLs discovered by
    /// following redirects.
    pub batch_id: Option<BatchId>,
    /// Collector of the owning batch.
    pub collector_type: Option<CollectorType>,
    pub status: UrlStatus,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Raw metadata blob supplied by the collector.
    #[serde(default)]
    pub collector_metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A URL as handed over by a collector, before canonicalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectedUrl {
    pub url: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl CollectedUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Insert request for a new URL row. `url` must already be canonical.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUrl {
    pub url: String,
    pub batch_id: Option<BatchId>,
    pub collector_metadata: serde_json::Value,
}

/// Result of the atomic insert-or-report-existing primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(UrlId),
    Existing(UrlId),
}

/// Records that a batch sighted an already-known URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicateRecord {
    pub id: i64,
    pub original_url_id: UrlId,
    pub batch_id: BatchId,
    pub created_at: DateTime<Utc>,
}

/// Final human review outcome for a submitted URL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approved,
    Rejected,
    HumanLabeling,
}

impl ReviewOutcome {
    pub fn as_status(&self) -> UrlStatus {
        match self {
            ReviewOutcome::Approved => UrlStatus::Approved,
            ReviewOutcome::Rejected => UrlStatus::Rejected,
            ReviewOutcome::HumanLabeling => UrlStatus::HumanLabeling,
        }
    }
}

// ============================================================================
// Per-stage artifacts
// ============================================================================

/// Result of probing a URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebMetadata {
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub error: Option<String>,
}

impl WebMetadata {
    pub fn is_success(&self) -> bool {
        matches!(self.status_code, Some(code) if (200..300).contains(&code))
    }
}

/// Retrieved page content with the fields parsed out of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HtmlContent {
    pub html: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub h1: Option<String>,
    /// Title of the site's root page.
    pub root_page_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in UrlStatus::ALL {
            assert_eq!(status.as_str().parse::<UrlStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<UrlStatus>().is_err());
    }

    #[test]
    fn test_pending_transitions() {
        let s = UrlStatus::Pending;
        assert!(s.can_transition_to(UrlStatus::Submitted));
        assert!(s.can_transition_to(UrlStatus::Duplicate));
        assert!(s.can_transition_to(UrlStatus::Error));
        assert!(s.can_transition_to(UrlStatus::Validated));
        assert!(!s.can_transition_to(UrlStatus::Approved));
        assert!(!s.can_transition_to(UrlStatus::HumanLabeling));
    }

    #[test]
    fn test_review_transitions_only_from_submitted() {
        assert!(UrlStatus::Submitted.can_transition_to(UrlStatus::Approved));
        assert!(UrlStatus::Submitted.can_transition_to(UrlStatus::Rejected));
        assert!(UrlStatus::Submitted.can_transition_to(UrlStatus::HumanLabeling));
        assert!(UrlStatus::HumanLabeling.can_transition_to(UrlStatus::Approved));
        assert!(!UrlStatus::Validated.can_transition_to(UrlStatus::Approved));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in [UrlStatus::Approved, UrlStatus::Rejected, UrlStatus::Duplicate] {
            assert!(status.is_terminal());
            for target in UrlStatus::ALL {
                assert!(!status.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_error_can_only_reset_to_pending() {
        for target in UrlStatus::ALL {
            assert_eq!(
                UrlStatus::Error.can_transition_to(target),
                target == UrlStatus::Pending
            );
        }
    }

    #[test]
    fn test_batch_status_strings() {
        assert_eq!(BatchStatus::InProcess.as_str(), "in-process");
        assert_eq!("aborted".parse::<BatchStatus>().unwrap(), BatchStatus::Aborted);
        let json = serde_json::to_string(&BatchStatus::InProcess).unwrap();
        assert_eq!(json, r#""in-process""#);
    }

    #[test]
    fn test_collector_type_round_trip() {
        for c in CollectorType::ALL {
            assert_eq!(c.as_str().parse::<CollectorType>().unwrap(), c);
        }
    }

    #[test]
    fn test_batch_success_rate() {
        let now = Utc::now();
        let mut batch = Batch {
            id: 1,
            strategy: CollectorType::Ckan,
            user_id: 1,
            status: BatchStatus::Complete,
            counts: BatchCounts::default(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(batch.success_rate(), None);
        batch.counts = BatchCounts {
            total: 4,
            new: 3,
            duplicate: 1,
        };
        assert_eq!(batch.success_rate(), Some(0.75));
    }

    #[test]
    fn test_web_metadata_success() {
        let ok = WebMetadata {
            status_code: Some(204),
            content_type: None,
            error: None,
        };
        assert!(ok.is_success());
        let not_found = WebMetadata {
            status_code: Some(404),
            ..ok.clone()
        };
        assert!(!not_found.is_success());
        let failed = WebMetadata {
            status_code: None,
            content_type: None,
            error: Some("timeout".into()),
        };
        assert!(!failed.is_success());
    }
}
