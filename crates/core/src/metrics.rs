//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Task operators (runs, per-item outcomes, retries, duration)
//! - URL lifecycle (ingestion, status transitions)
//! - Root URL cache lookups
//! - Function triggers (started cycles, coalesced reruns)
//! - External collaborators (fetchers, classifiers)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Task Operators
// =============================================================================

/// Task runs by task type and result.
pub static TASK_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("collector_task_runs_total", "Total task operator runs"),
        &["task_type", "result"], // "complete", "timed_out", "aborted", "fatal"
    )
    .unwrap()
});

/// Per-item outcomes within task runs.
pub static TASK_ITEMS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("collector_task_items_total", "Total items processed by task operators"),
        &["task_type", "outcome"], // "succeeded", "errored", "abandoned"
    )
    .unwrap()
});

/// Item retries after retryable stage errors.
pub static TASK_ITEM_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("collector_task_item_retries_total", "Total item retry attempts"),
        &["task_type"],
    )
    .unwrap()
});

/// Task run duration in seconds.
pub static TASK_RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "collector_task_run_duration_seconds",
            "Duration of task operator runs",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 180.0, 600.0]),
        &["task_type"],
    )
    .unwrap()
});

// =============================================================================
// URL Lifecycle
// =============================================================================

/// URLs seen during batch ingestion.
pub static URLS_INGESTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("collector_urls_ingested_total", "Total URLs seen by ingestion"),
        &["result"], // "new", "duplicate", "invalid"
    )
    .unwrap()
});

/// Applied URL status transitions.
pub static STATUS_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "collector_status_transitions_total",
            "Total URL status transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

// =============================================================================
// Root URL Cache
// =============================================================================

/// Root cache lookups by result.
pub static ROOT_CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("collector_root_cache_lookups_total", "Total root URL cache lookups"),
        &["result"], // "memory_hit", "store_hit", "fetched", "fetch_error"
    )
    .unwrap()
});

// =============================================================================
// Triggers
// =============================================================================

/// Function trigger cycles.
pub static TRIGGER_CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("collector_trigger_cycles_total", "Total function trigger cycles"),
        &["trigger", "kind"], // kind: "initial", "rerun"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "collector_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "collector_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Task operators
        Box::new(TASK_RUNS.clone()),
        Box::new(TASK_ITEMS.clone()),
        Box::new(TASK_ITEM_RETRIES.clone()),
        Box::new(TASK_RUN_DURATION.clone()),
        // Lifecycle
        Box::new(URLS_INGESTED.clone()),
        Box::new(STATUS_TRANSITIONS.clone()),
        // Root cache
        Box::new(ROOT_CACHE_LOOKUPS.clone()),
        // Triggers
        Box::new(TRIGGER_CYCLES.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        TASK_RUNS.with_label_values(&["probe", "complete"]).inc();
        assert!(!registry.gather().is_empty());
    }
}
