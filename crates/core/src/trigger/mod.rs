//! Coalescing trigger for recurring async jobs.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::debug;

use crate::metrics::TRIGGER_CYCLES;

type TriggerFn = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Default)]
struct TriggerState {
    running: bool,
    rerun_requested: bool,
}

/// Runs a job so that it never overlaps with itself.
///
/// Calls that arrive while a cycle is running set a rerun flag instead of
/// starting another cycle, so any burst of calls during one cycle yields at
/// most one extra cycle. Every caller returns once the cycle it observed,
/// plus any rerun it caused, has finished.
pub struct FunctionTrigger {
    name: String,
    func: TriggerFn,
    state: Mutex<TriggerState>,
    /// Incremented each time the loop exits.
    completed: watch::Sender<u64>,
}

impl FunctionTrigger {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (completed, _) = watch::channel(0);
        Self {
            name: name.into(),
            func: Box::new(move || Box::pin(func())),
            state: Mutex::new(TriggerState::default()),
            completed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Run the job, or request a rerun of the one in flight, and wait for
    /// it to finish.
    pub async fn trigger_or_rerun(&self) {
        let in_flight = {
            let mut state = self.lock();
            if state.running {
                state.rerun_requested = true;
                Some(*self.completed.borrow())
            } else {
                state.running = true;
                None
            }
        };
        if let Some(observed) = in_flight {
            debug!(trigger = %self.name, "Cycle in flight, rerun requested");
            let mut rx = self.completed.subscribe();
            // The sender lives in self, so this only ends once the epoch moves.
            let _ = rx.wait_for(|epoch| *epoch > observed).await;
            return;
        }

        let mut guard = RunGuard {
            trigger: self,
            armed: true,
        };
        TRIGGER_CYCLES.with_label_values(&[self.name.as_str(), "initial"]).inc();
        loop {
            (self.func)().await;

            let mut state = self.lock();
            if state.rerun_requested {
                state.rerun_requested = false;
                drop(state);
                TRIGGER_CYCLES.with_label_values(&[self.name.as_str(), "rerun"]).inc();
                debug!(trigger = %self.name, "Running requested rerun");
                continue;
            }
            state.running = false;
            // Bumped under the lock so a caller that saw `running` cannot miss it.
            self.completed.send_modify(|epoch| *epoch += 1);
            break;
        }
        guard.armed = false;
    }

    fn lock(&self) -> MutexGuard<'_, TriggerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases waiters if a cycle is dropped or panics part way.
struct RunGuard<'a> {
    trigger: &'a FunctionTrigger,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.trigger.lock();
        state.running = false;
        state.rerun_requested = false;
        self.trigger.completed.send_modify(|epoch| *epoch += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Probe {
        runs: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    fn counting_trigger(delay: Duration) -> (Arc<FunctionTrigger>, Arc<Probe>) {
        let probe = Arc::new(Probe {
            runs: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        });
        let p = probe.clone();
        let trigger = FunctionTrigger::new("test", move || {
            let p = p.clone();
            async move {
                let now = p.active.fetch_add(1, Ordering::SeqCst) + 1;
                p.max_active.fetch_max(now, Ordering::SeqCst);
                p.runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                p.active.fetch_sub(1, Ordering::SeqCst);
            }
        });
        (Arc::new(trigger), probe)
    }

    #[tokio::test]
    async fn test_single_call_runs_once() {
        let (trigger, probe) = counting_trigger(Duration::from_millis(5));
        trigger.trigger_or_rerun().await;
        assert_eq!(probe.runs.load(Ordering::SeqCst), 1);
        assert!(!trigger.is_running());
    }

    #[tokio::test]
    async fn test_sequential_calls_each_run() {
        let (trigger, probe) = counting_trigger(Duration::from_millis(1));
        trigger.trigger_or_rerun().await;
        trigger.trigger_or_rerun().await;
        assert_eq!(probe.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_rerun() {
        let (trigger, probe) = counting_trigger(Duration::from_millis(100));

        let first = {
            let trigger = trigger.clone();
            tokio::spawn(async move { trigger.trigger_or_rerun().await })
        };
        while !trigger.is_running() {
            tokio::task::yield_now().await;
        }

        let mut waiters = Vec::new();
        for _ in 0..10 {
            let trigger = trigger.clone();
            waiters.push(tokio::spawn(async move { trigger.trigger_or_rerun().await }));
        }
        for waiter in waiters {
            waiter.await.unwrap();
        }
        // Waiters return only after the rerun they caused.
        assert_eq!(probe.runs.load(Ordering::SeqCst), 2);

        first.await.unwrap();
        assert_eq!(probe.runs.load(Ordering::SeqCst), 2);
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
        assert!(!trigger.is_running());
    }

    #[tokio::test]
    async fn test_cancelled_cycle_releases_waiters() {
        let (trigger, _) = counting_trigger(Duration::from_secs(60));

        let runner = {
            let trigger = trigger.clone();
            tokio::spawn(async move { trigger.trigger_or_rerun().await })
        };
        while !trigger.is_running() {
            tokio::task::yield_now().await;
        }
        let waiter = {
            let trigger = trigger.clone();
            tokio::spawn(async move { trigger.trigger_or_rerun().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        runner.abort();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter released")
            .unwrap();
        assert!(!trigger.is_running());
    }
}
