use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::fetch::DEFAULT_USER_AGENT;
use crate::operator::OperatorConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub root_cache: RootCacheConfig,
    #[serde(default)]
    pub tasks: OperatorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Enables the relevancy and record type stages.
    #[serde(default)]
    pub classifier: Option<ClassifierConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("collector.db")
}

/// Outbound HTTP settings for page fetches and probes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Page fetch timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    /// Probe request timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_http_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    15
}

/// Root URL cache settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RootCacheConfig {
    /// Refetch entries older than this. Absent means entries never expire.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

/// Recurring job settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How often the URL task pipeline is triggered.
    #[serde(default = "default_url_tasks_interval")]
    pub url_tasks_interval_secs: u64,
    /// How often agencies are synced from upstream.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url_tasks_interval_secs: default_url_tasks_interval(),
            sync_interval_secs: default_sync_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_url_tasks_interval() -> u64 {
    60
}

fn default_sync_interval() -> u64 {
    86_400 // daily
}

/// Classifier service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Base URL (e.g., "http://localhost:8000")
    pub endpoint: String,
    /// Bearer token, if the service requires one
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds (default: 60)
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            api_key: None,
            timeout_secs: default_classifier_timeout(),
        }
    }
}

fn default_classifier_timeout() -> u64 {
    60
}

/// Log output settings. Filtering is controlled by `RUST_LOG`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub root_cache: RootCacheConfig,
    pub tasks: OperatorConfig,
    pub scheduler: SchedulerConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<SanitizedClassifierConfig>,
    pub logging: LoggingConfig,
}

/// Sanitized classifier config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedClassifierConfig {
    pub endpoint: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            database: config.database.clone(),
            http: config.http.clone(),
            root_cache: config.root_cache.clone(),
            tasks: config.tasks.clone(),
            scheduler: config.scheduler.clone(),
            classifier: config
                .classifier
                .as_ref()
                .map(|c| SanitizedClassifierConfig {
                    endpoint: c.endpoint.clone(),
                    api_key_configured: c.api_key.as_deref().is_some_and(|k| !k.is_empty()),
                    timeout_secs: c.timeout_secs,
                }),
            logging: config.logging.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "collector.db");
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.http.probe_timeout_secs, 15);
        assert!(config.http.user_agent.starts_with("Mozilla/5.0"));
        assert_eq!(config.root_cache.max_age_secs, None);
        assert_eq!(config.tasks.batch_size, 100);
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.url_tasks_interval_secs, 60);
        assert!(config.classifier.is_none());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[database]
path = "/data/collector.sqlite"

[http]
user_agent = "collector-test"
timeout_secs = 10
probe_timeout_secs = 3

[root_cache]
max_age_secs = 3600

[tasks]
batch_size = 50
max_concurrency = 4

[scheduler]
enabled = false
sync_interval_secs = 3600

[classifier]
endpoint = "http://classifier:8000"
api_key = "secret"

[logging]
json = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.http.user_agent, "collector-test");
        assert_eq!(config.root_cache.max_age_secs, Some(3600));
        assert_eq!(config.tasks.batch_size, 50);
        assert_eq!(config.tasks.max_concurrency, 4);
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.url_tasks_interval_secs, 60);
        let classifier = config.classifier.as_ref().unwrap();
        assert_eq!(classifier.api_key.as_deref(), Some("secret"));
        assert_eq!(classifier.timeout_secs, 60);
        assert!(config.logging.json);
    }

    #[test]
    fn test_classifier_requires_endpoint() {
        let toml = r#"
[classifier]
api_key = "secret"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitized_config_hides_api_key() {
        let config = Config {
            classifier: Some(ClassifierConfig {
                api_key: Some("secret-key".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let sanitized = SanitizedConfig::from(&config);
        let classifier = sanitized.classifier.as_ref().unwrap();
        assert!(classifier.api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-key"));
    }
}
