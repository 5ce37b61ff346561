//! Cleanup of objects being deleted.

use super::{ReconcileOutcome, Reconciler, ReconcilerError};
use crate::controller::key::ReconcileKey;
use crate::controller::store::StoreError;
use kube::core::DynamicObject;
use kube::ResourceExt;
use tracing::{info, warn};

impl Reconciler {
    /// Run cleanup and release our finalizer
    ///
    /// The finalizer stays in place until cleanup succeeds, so the object
    /// cannot disappear with dependent resources left behind. A malformed
    /// object is not retried; it stays blocked until someone fixes it.
    pub(super) async fn finalize(&self, key: &ReconcileKey, obj: &DynamicObject) -> ReconcileOutcome {
        info!("Deletion requested, running cleanup");

        match self.descriptor.capability.cleanup(obj).await {
            Ok(()) => {}
            Err(e) if e.is_terminal() => {
                // Retrying cannot fix a malformed object; wait for it to change
                warn!("Cleanup rejected, finalizer kept until the object changes: {}", e);
                let reason = e.to_string();
                self.record_failure(key, obj, &reason).await;
                return ReconcileOutcome::TerminalSkip(reason);
            }
            Err(e) => {
                warn!("Cleanup failed, finalizer kept: {}", e);
                self.record_failure(key, obj, &e.to_string()).await;
                return ReconcileOutcome::RetryableFailure(ReconcilerError::Cleanup(e));
            }
        }

        let remaining: Vec<String> = obj
            .finalizers()
            .iter()
            .filter(|f| **f != self.descriptor.finalizer)
            .cloned()
            .collect();

        match self.updater.update_finalizers(key, obj, &remaining).await {
            Ok(_) => {
                info!("Cleanup complete, finalizer released");
                ReconcileOutcome::Success
            }
            Err(StoreError::NotFound) => ReconcileOutcome::Success,
            Err(e) => ReconcileOutcome::RetryableFailure(ReconcilerError::Finalizers(e)),
        }
    }
}
