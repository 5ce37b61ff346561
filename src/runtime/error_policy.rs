//! # Error Policy
//!
//! Maps the outcome of a reconcile pass onto queue operations.
//!
//! | outcome            | queue action                                   |
//! |--------------------|------------------------------------------------|
//! | `Success`          | forget                                         |
//! | `TerminalSkip`     | forget                                         |
//! | `Requeue`          | forget, add                                    |
//! | `RetryableFailure` | rate-limited add, or forget once retries run out |

use crate::controller::key::ReconcileKey;
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::ReconcileOutcome;
use crate::observability;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What happened to a key after its pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Failure history cleared; the key waits for the next change
    Forgotten,
    /// Queued again right away
    Requeued,
    /// Queued again after a backoff delay
    RetryScheduled(Duration),
    /// Retry ceiling reached; dropped until the next change or resync
    Exhausted,
}

/// Apply `outcome` for `key` to the queue
pub fn handle_outcome(
    queue: &Arc<WorkQueue<ReconcileKey>>,
    key: &ReconcileKey,
    outcome: &ReconcileOutcome,
    max_retries: u32,
) -> Disposition {
    match outcome {
        ReconcileOutcome::Success => {
            debug!(resource = %key, "Reconciled");
            queue.forget(key);
            Disposition::Forgotten
        }
        ReconcileOutcome::TerminalSkip(reason) => {
            warn!(resource = %key, "Skipping until the object changes: {}", reason);
            observability::metrics::increment_reconciliation_errors("terminal");
            queue.forget(key);
            Disposition::Forgotten
        }
        ReconcileOutcome::Requeue => {
            debug!(resource = %key, "Step converged, requeueing");
            observability::metrics::increment_requeues("step");
            queue.forget(key);
            queue.add(key.clone());
            Disposition::Requeued
        }
        ReconcileOutcome::RetryableFailure(err) => {
            observability::metrics::increment_reconciliation_errors(err.reason());
            let failures = queue.num_requeues(key);
            if failures < max_retries {
                let delay = queue.add_rate_limited(key.clone());
                observability::metrics::increment_requeues("backoff");
                info!(
                    resource = %key,
                    attempt = failures + 1,
                    max_retries,
                    "🔄 Retrying in {:?}: {}",
                    delay,
                    err
                );
                Disposition::RetryScheduled(delay)
            } else {
                error!(
                    resource = %key,
                    max_retries,
                    "Dropping key after exhausting retries: {}",
                    err
                );
                observability::metrics::increment_retries_exhausted();
                queue.forget(key);
                Disposition::Exhausted
            }
        }
    }
}
