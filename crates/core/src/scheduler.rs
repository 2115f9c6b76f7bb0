//! Recurring background jobs.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Runs named jobs on fixed intervals until shut down.
///
/// A job that overruns its interval delays the next tick; ticks are never
/// run concurrently for the same job.
pub struct Scheduler {
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            running: Arc::new(AtomicBool::new(true)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Run `job` every `interval`, first after one interval has passed.
    pub async fn spawn_recurring<F, Fut>(&self, name: &'static str, interval: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.running.load(Ordering::SeqCst) {
            warn!(job = name, "Scheduler is shut down; job not started");
            return;
        }
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!(job = name, interval_secs = interval.as_secs(), "Recurring job started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        job().await;
                    }
                }
            }
            info!(job = name, "Recurring job stopped");
        });
        self.handles.lock().await.push(handle);
    }

    /// Stop every job and wait for in-flight runs to finish.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Recurring job panicked");
            }
        }
    }
}
