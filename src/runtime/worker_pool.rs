//! # Worker Pool
//!
//! Fixed set of workers draining the shared queue. A key is handed to at
//! most one worker at a time; different keys run in parallel.

use crate::config::ControllerConfig;
use crate::controller::backoff::ExponentialBackoff;
use crate::controller::key::{ManagedKind, ReconcileKey};
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::Reconciler;
use crate::observability;
use crate::runtime::error_policy::{handle_outcome, Disposition};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Enqueue callback handed to change sources
pub type Enqueue = Arc<dyn Fn(ReconcileKey) + Send + Sync>;

pub struct ControllerRuntime {
    queue: Arc<WorkQueue<ReconcileKey>>,
    reconcilers: HashMap<ManagedKind, Arc<Reconciler>>,
    max_retries: u32,
}

impl std::fmt::Debug for ControllerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerRuntime")
            .field("kinds", &self.reconcilers.keys().collect::<Vec<_>>())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ControllerRuntime {
    #[must_use]
    pub fn new(config: &ControllerConfig, reconcilers: Vec<Reconciler>) -> Self {
        let backoff = ExponentialBackoff::new(config.backoff_base(), config.backoff_max());
        Self {
            queue: Arc::new(
                WorkQueue::new(backoff).with_depth_observer(observability::metrics::set_queue_depth),
            ),
            reconcilers: reconcilers
                .into_iter()
                .map(|r| (r.descriptor().kind, Arc::new(r)))
                .collect(),
            max_retries: config.max_retries,
        }
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<WorkQueue<ReconcileKey>> {
        &self.queue
    }

    /// Callback that feeds keys into this runtime's queue
    #[must_use]
    pub fn enqueuer(&self) -> Enqueue {
        let queue = Arc::clone(&self.queue);
        Arc::new(move |key: ReconcileKey| queue.add(key))
    }

    /// Run `workers` workers until `cancel` fires
    ///
    /// On cancellation the queue is shut down and this waits for every
    /// worker to finish the item it is processing.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken, workers: usize) {
        let workers = workers.max(1);
        info!("Starting {} workers", workers);

        let mut tasks = JoinSet::new();
        for id in 0..workers {
            let runtime = Arc::clone(&self);
            let cancel = cancel.clone();
            tasks.spawn(async move { runtime.worker(id, cancel).await });
        }

        cancel.cancelled().await;
        info!("Shutdown requested, stopping workers");
        self.queue.shut_down();

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
            }
        }
        info!("All workers stopped");
    }

    async fn worker(&self, id: usize, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            if self.process_next_work_item().await.is_none() {
                break;
            }
        }
        info!(worker = id, "Worker exiting");
    }

    /// Take one key, reconcile it and settle it with the queue
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub async fn process_next_work_item(&self) -> Option<Disposition> {
        let key = self.queue.get().await?;

        let disposition = match self.reconcilers.get(&key.kind) {
            Some(reconciler) => {
                let start = Instant::now();
                observability::metrics::increment_reconciliations(key.kind.as_str());
                let outcome = reconciler.reconcile_key(&key).await;
                observability::metrics::observe_reconciliation_duration(
                    key.kind.as_str(),
                    start.elapsed().as_secs_f64(),
                );
                handle_outcome(&self.queue, &key, &outcome, self.max_retries)
            }
            None => {
                warn!(resource = %key, "No reconciler registered for kind, dropping key");
                self.queue.forget(&key);
                Disposition::Forgotten
            }
        };

        self.queue.done(&key);
        Some(disposition)
    }
}
