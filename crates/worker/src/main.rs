mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sourcecollector_core::{
    load_config, validate_config, Config, HtmlStage, HttpClassifier, HttpPageFetcher, HttpProber,
    LifecycleManager, MiscMetadataStage, Operator, ProbeStage, RecordTypeStage, RelevancyStage,
    RootUrlCache, SanitizedConfig, Scheduler, SqliteStore, TaskManager, TaskOperator,
};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("COLLECTOR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let config = load_startup_config(&config_path)?;

    if !config_path.exists() {
        info!("No config file at {:?}, using defaults", config_path);
    }
    validate_config(&config).context("Configuration validation failed")?;
    info!(
        config = %serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default(),
        "Configuration loaded"
    );

    let store = Arc::new(
        SqliteStore::new(&config.database.path)
            .with_context(|| format!("Failed to open database {:?}", config.database.path))?,
    );
    info!("Database opened at {:?}", config.database.path);
    let lifecycle = Arc::new(LifecycleManager::from_store(store.clone()));

    let fetcher = Arc::new(HttpPageFetcher::new(&config.http).context("Failed to build page fetcher")?);
    let prober = Arc::new(HttpProber::new(&config.http).context("Failed to build prober")?);

    let mut root_cache = RootUrlCache::new(store.clone(), fetcher.clone());
    if let Some(secs) = config.root_cache.max_age_secs {
        root_cache = root_cache.with_max_age(Duration::from_secs(secs));
    }
    let root_cache = Arc::new(root_cache);
    let warmed = root_cache
        .warm()
        .await
        .context("Failed to load root URL cache")?;
    info!("Root URL cache loaded with {} entries", warmed);

    let operators = build_operators(&config, store.clone(), lifecycle, fetcher, prober, root_cache)?;
    let manager = TaskManager::new(operators, None, config.tasks.clone());
    info!(stages = ?manager.task_types(), "Task manager ready");

    let scheduler = Scheduler::new();
    if config.scheduler.enabled {
        let url_manager = manager.clone();
        scheduler
            .spawn_recurring(
                "url_tasks",
                Duration::from_secs(config.scheduler.url_tasks_interval_secs),
                move || {
                    let manager = url_manager.clone();
                    async move { manager.trigger_task_run().await }
                },
            )
            .await;
        info!("Scheduler started");
    } else {
        info!("Scheduler disabled in config");
    }

    // Run once at startup so queued work does not wait a full interval.
    let startup_run = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.trigger_task_run().await })
    };

    shutdown_signal().await;
    info!("Shutting down...");
    drain(&scheduler, startup_run).await;
    debug!("Final metrics:\n{}", metrics::render());
    info!("Worker stopped");
    Ok(())
}

/// Load the config file, or defaults when it is absent, and install the
/// log subscriber. Logging is set up even when loading fails so the error
/// is printed.
fn load_startup_config(path: &Path) -> Result<Config> {
    let loaded = if path.exists() {
        load_config(path).with_context(|| format!("Failed to load config from {:?}", path))
    } else {
        Ok(Config::default())
    };
    init_logging(loaded.as_ref().map(|c| c.logging.json).unwrap_or(false));
    loaded
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if installed.is_err() {
        debug!("Log subscriber already installed");
    }
}

/// Stop the scheduler, then wait for the startup cycle. Cycles are never
/// cancelled part way, so their task rows always get closed.
async fn drain(scheduler: &Scheduler, startup_run: JoinHandle<()>) {
    scheduler.shutdown().await;
    if let Err(e) = startup_run.await {
        warn!(error = %e, "Startup run panicked");
    }
}

/// URL stages in pipeline order. The classifier stages are only present
/// when a classifier endpoint is configured.
fn build_operators(
    config: &Config,
    store: Arc<SqliteStore>,
    lifecycle: Arc<LifecycleManager>,
    fetcher: Arc<HttpPageFetcher>,
    prober: Arc<HttpProber>,
    root_cache: Arc<RootUrlCache>,
) -> Result<Vec<Arc<dyn Operator>>> {
    let tasks = config.tasks.clone();
    let mut operators: Vec<Arc<dyn Operator>> = vec![
        Arc::new(TaskOperator::new(
            ProbeStage::new(store.clone(), lifecycle.clone(), prober),
            lifecycle.clone(),
            store.clone(),
            tasks.clone(),
        )),
        Arc::new(TaskOperator::new(
            HtmlStage::new(store.clone(), fetcher, root_cache),
            lifecycle.clone(),
            store.clone(),
            tasks.clone(),
        )),
    ];

    match &config.classifier {
        Some(classifier_config) => {
            let classifier = Arc::new(
                HttpClassifier::new(classifier_config).context("Failed to build classifier")?,
            );
            info!("Classifier configured at {}", classifier_config.endpoint);
            operators.push(Arc::new(TaskOperator::new(
                RelevancyStage::new(store.clone(), lifecycle.clone(), classifier.clone()),
                lifecycle.clone(),
                store.clone(),
                tasks.clone(),
            )));
            operators.push(Arc::new(TaskOperator::new(
                RecordTypeStage::new(store.clone(), lifecycle.clone(), classifier),
                lifecycle.clone(),
                store.clone(),
                tasks.clone(),
            )));
        }
        None => info!("No classifier configured; relevancy and record type stages disabled"),
    }

    operators.push(Arc::new(TaskOperator::new(
        MiscMetadataStage::new(store.clone(), store.clone(), lifecycle.clone()),
        lifecycle,
        store,
        tasks,
    )));
    Ok(operators)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
