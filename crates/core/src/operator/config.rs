//! Configuration for task operators.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Longest accepted run deadline: one week.
pub const MAX_BATCH_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Limits and retry policy shared by every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// URLs pulled per task run.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Items processed at once within a run.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Overall deadline for one run, in seconds.
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,

    /// Extra attempts for an item whose failure is retryable.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubled on each further attempt.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Abort the run once this many items have errored. Unset means never.
    #[serde(default)]
    pub max_item_failures: Option<usize>,

    /// Consecutive runs of one stage before the manager moves on.
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: usize,
}

fn default_batch_size() -> usize {
    100
}

fn default_max_concurrency() -> usize {
    10
}

fn default_batch_timeout() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_repeat_threshold() -> usize {
    20
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            batch_timeout_secs: default_batch_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            max_item_failures: None,
            repeat_threshold: default_repeat_threshold(),
        }
    }
}

impl OperatorConfig {
    /// Run deadline, capped at [`MAX_BATCH_TIMEOUT_SECS`].
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs.min(MAX_BATCH_TIMEOUT_SECS))
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.batch_timeout(), Duration::from_secs(600));
        assert_eq!(config.max_item_failures, None);
    }

    #[test]
    fn test_backoff_doubles() {
        let config = OperatorConfig {
            retry_backoff_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.backoff_for(0), Duration::from_millis(100));
        assert_eq!(config.backoff_for(1), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_batch_timeout_is_capped() {
        let config = OperatorConfig {
            batch_timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(
            config.batch_timeout(),
            Duration::from_secs(MAX_BATCH_TIMEOUT_SECS)
        );
        // The deadline computed from it must not overflow.
        assert!(tokio::time::Instant::now()
            .checked_add(config.batch_timeout())
            .is_some());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: OperatorConfig = toml::from_str("batch_size = 5").unwrap();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.repeat_threshold, 20);
    }
}
