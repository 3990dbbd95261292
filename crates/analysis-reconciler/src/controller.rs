//! Worker pool driving the reconciler from the work queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backoff::BackoffPolicy;
use crate::queue::WorkQueue;
use crate::reconciler::{ReconcileAction, Reconciler};

/// Default backoff after a reconcile returns an error.
const ERROR_BACKOFF_BASE: Duration = Duration::from_millis(500);
const ERROR_BACKOFF_MAX: Duration = Duration::from_secs(60);

pub struct Controller {
    reconciler: Arc<Reconciler>,
    queue: WorkQueue,
    workers: usize,
    error_backoff: BackoffPolicy,
}

impl Controller {
    pub fn new(reconciler: Arc<Reconciler>, workers: usize) -> Self {
        Self {
            reconciler,
            queue: WorkQueue::new(),
            workers: workers.max(1),
            error_backoff: BackoffPolicy::new(ERROR_BACKOFF_BASE, ERROR_BACKOFF_MAX),
        }
    }

    pub fn with_error_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Schedule a record for reconciliation.
    pub fn enqueue(&self, id: impl Into<String>) {
        self.queue.add(id);
    }

    /// Run until `cancel` fires. In-flight reconciles finish; nothing is
    /// scheduled after cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        info!(workers = self.workers, "Controller starting");

        let failures: Arc<Mutex<HashMap<String, u32>>> = Arc::default();
        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            workers.spawn(worker_loop(
                worker,
                self.reconciler.clone(),
                self.queue.clone(),
                self.error_backoff,
                failures.clone(),
                cancel.clone(),
            ));
        }

        let queue = self.queue.clone();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                queue.shut_down();
            }
        });

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Controller worker panicked");
            }
        }
        watcher.abort();
        info!("Controller stopped");
    }
}

async fn worker_loop(
    worker: usize,
    reconciler: Arc<Reconciler>,
    queue: WorkQueue,
    error_backoff: BackoffPolicy,
    failures: Arc<Mutex<HashMap<String, u32>>>,
    cancel: CancellationToken,
) {
    debug!(worker, "Worker started");
    while let Some(key) = queue.get().await {
        let result = reconciler.reconcile(&key).await;

        if cancel.is_cancelled() {
            queue.done(&key);
            break;
        }

        match result {
            Ok(action) => {
                clear_failures(&failures, &key);
                match action {
                    ReconcileAction::Done => {}
                    ReconcileAction::Requeue => queue.add(key.clone()),
                    ReconcileAction::RequeueAfter(delay) => queue.add_after(key.clone(), delay),
                }
            }
            Err(e) => {
                let attempt = record_failure(&failures, &key);
                let delay = error_backoff.compute_delay(attempt);
                error!(
                    worker,
                    record = %key,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Reconcile failed, requeueing"
                );
                queue.add_after(key.clone(), delay);
            }
        }
        queue.done(&key);
    }
    debug!(worker, "Worker stopped");
}

/// Bump the consecutive failure count for `key`, returning the previous one.
fn record_failure(failures: &Mutex<HashMap<String, u32>>, key: &str) -> u32 {
    let mut failures = failures.lock().unwrap_or_else(|p| p.into_inner());
    let count = failures.entry(key.to_string()).or_insert(0);
    let previous = *count;
    *count = count.saturating_add(1);
    previous
}

fn clear_failures(failures: &Mutex<HashMap<String, u32>>, key: &str) {
    failures
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .remove(key);
}
