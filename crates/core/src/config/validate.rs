use super::{types::Config, ConfigError};
use crate::operator::MAX_BATCH_TIMEOUT_SECS;

/// Validate configuration
/// Currently validates:
/// - Task batch size, concurrency, timeout and repeat threshold are non-zero
/// - Task batch timeout is at most one week
/// - HTTP timeouts are non-zero
/// - Scheduler intervals are non-zero when the scheduler is enabled
/// - Classifier endpoint is an absolute http(s) URL
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let tasks = &config.tasks;
    for (name, value) in [
        ("tasks.batch_size", tasks.batch_size as u64),
        ("tasks.max_concurrency", tasks.max_concurrency as u64),
        ("tasks.batch_timeout_secs", tasks.batch_timeout_secs),
        ("tasks.repeat_threshold", tasks.repeat_threshold as u64),
        ("http.timeout_secs", config.http.timeout_secs),
        ("http.probe_timeout_secs", config.http.probe_timeout_secs),
    ] {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{name} cannot be 0"
            )));
        }
    }

    if tasks.batch_timeout_secs > MAX_BATCH_TIMEOUT_SECS {
        return Err(ConfigError::ValidationError(format!(
            "tasks.batch_timeout_secs cannot exceed {MAX_BATCH_TIMEOUT_SECS}"
        )));
    }

    if tasks.max_item_failures == Some(0) {
        return Err(ConfigError::ValidationError(
            "tasks.max_item_failures cannot be 0 (omit it to disable early abort)".to_string(),
        ));
    }

    if config.scheduler.enabled
        && (config.scheduler.url_tasks_interval_secs == 0
            || config.scheduler.sync_interval_secs == 0)
    {
        return Err(ConfigError::ValidationError(
            "scheduler intervals cannot be 0".to_string(),
        ));
    }

    if let Some(ref classifier) = config.classifier {
        match url::Url::parse(&classifier.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "classifier.endpoint is not an http(s) URL: {}",
                    classifier.endpoint
                )))
            }
        }
    }

    Ok(())
}
