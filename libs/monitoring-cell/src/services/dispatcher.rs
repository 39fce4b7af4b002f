// =====================================================================================
// EVALUATION DISPATCHER - PER-TARGET BACKGROUND WORKERS
// =====================================================================================

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use shared_models::Metric;

use crate::services::alerts::AlertLifecycleManager;

enum Job {
    Evaluate(Metric),
    Flush(oneshot::Sender<()>),
}

struct Worker {
    jobs: mpsc::UnboundedSender<Job>,
    retired: Arc<AtomicBool>,
}

/// Runs evaluation passes off the ingestion path. Each target gets one worker
/// and an unbounded FIFO queue, so passes for a target never overlap while
/// different targets proceed concurrently.
pub struct EvaluationDispatcher {
    manager: Arc<AlertLifecycleManager>,
    workers: Mutex<HashMap<String, Worker>>,
}

impl EvaluationDispatcher {
    pub fn new(manager: Arc<AlertLifecycleManager>) -> Self {
        Self {
            manager,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Queues the metric and returns immediately. Must be called from within a
    /// tokio runtime.
    pub fn submit(&self, metric: Metric) {
        let api_id = metric.api_id.clone();
        self.enqueue(&api_id, Job::Evaluate(metric));
    }

    /// Resolves once every job queued for the target before this call has run.
    pub async fn flush(&self, api_id: &str) {
        let (tx, rx) = oneshot::channel();
        self.enqueue(api_id, Job::Flush(tx));
        let _ = rx.await;
    }

    /// Drops the target's queue. Metrics still queued are discarded without
    /// evaluation; pending flushes still resolve.
    pub fn retire(&self, api_id: &str) -> bool {
        let removed = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(api_id);
        if let Some(worker) = &removed {
            worker.retired.store(true, Ordering::SeqCst);
        }
        let removed = removed.is_some();
        if removed {
            debug!(api_id = %api_id, "Evaluation worker retired");
        }
        removed
    }

    pub fn active_workers(&self) -> usize {
        self.workers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn enqueue(&self, api_id: &str, job: Job) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());

        let job = match workers.get(api_id) {
            Some(worker) => match worker.jobs.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => {
                    warn!(api_id = %api_id, "Evaluation worker gone, restarting");
                    job
                }
            },
            None => job,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // a fresh receiver is alive, so this send cannot fail
        let _ = tx.send(job);
        let retired = Arc::new(AtomicBool::new(false));
        workers.insert(
            api_id.to_string(),
            Worker {
                jobs: tx,
                retired: retired.clone(),
            },
        );
        tokio::spawn(run_worker(self.manager.clone(), api_id.to_string(), rx, retired));
        debug!(api_id = %api_id, "Evaluation worker started");
    }
}

async fn run_worker(
    manager: Arc<AlertLifecycleManager>,
    api_id: String,
    mut rx: mpsc::UnboundedReceiver<Job>,
    retired: Arc<AtomicBool>,
) {
    let mut discarded = 0usize;
    while let Some(job) = rx.recv().await {
        match job {
            Job::Evaluate(_) if retired.load(Ordering::SeqCst) => discarded += 1,
            Job::Evaluate(metric) => {
                let pass = AssertUnwindSafe(manager.on_metric_ingested(&metric))
                    .catch_unwind()
                    .await;
                match pass {
                    Ok(Ok(report)) => {
                        debug!(
                            api_id = %api_id,
                            rules = report.outcomes.len(),
                            failures = report.failures(),
                            "Evaluation pass complete"
                        );
                    }
                    Ok(Err(e)) => error!(api_id = %api_id, error = %e, "Evaluation pass failed"),
                    Err(_) => error!(api_id = %api_id, "Evaluation pass panicked"),
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!(api_id = %api_id, discarded, "Evaluation worker stopped");
}
