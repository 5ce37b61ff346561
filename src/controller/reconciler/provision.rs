//! Finalizer attachment and provisioning of live objects.

use super::{ReconcileOutcome, Reconciler, ReconcilerError};
use crate::controller::key::ReconcileKey;
use crate::controller::store::StoreError;
use crate::controller::updater::current_status;
use crate::crd::ManagedStatus;
use kube::core::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Record our finalizer and a `Pending` status
    ///
    /// Provisioning happens on the next pass, once the finalizer is
    /// confirmed by the store.
    pub(super) async fn attach(&self, key: &ReconcileKey, obj: &DynamicObject) -> ReconcileOutcome {
        let mut finalizers = obj.finalizers().to_vec();
        finalizers.push(self.descriptor.finalizer.clone());

        let updated = match self.updater.update_finalizers(key, obj, &finalizers).await {
            Ok(updated) => updated,
            Err(StoreError::NotFound) => return ReconcileOutcome::Success,
            Err(e) => return ReconcileOutcome::RetryableFailure(ReconcilerError::Finalizers(e)),
        };
        info!(finalizer = %self.descriptor.finalizer, "Finalizer added");

        let status = ManagedStatus::pending(obj.metadata.generation);
        if let Err(e) = self.write_status(key, &updated, &status).await {
            return ReconcileOutcome::RetryableFailure(e);
        }
        ReconcileOutcome::Requeue
    }

    /// Provision dependent resources for the current generation
    pub(super) async fn provision(&self, key: &ReconcileKey, obj: &DynamicObject) -> ReconcileOutcome {
        let generation = obj.metadata.generation;
        if current_status(obj).is_some_and(|status| status.is_ready_for(generation)) {
            debug!(?generation, "Already provisioned for this generation");
            return ReconcileOutcome::Success;
        }

        match self
            .descriptor
            .capability
            .provision(obj, &self.descriptor.policy)
            .await
        {
            Ok(()) => {
                info!(?generation, "Provisioned");
                match self.write_status(key, obj, &ManagedStatus::ready(generation)).await {
                    Ok(()) => ReconcileOutcome::Success,
                    Err(e) => ReconcileOutcome::RetryableFailure(e),
                }
            }
            Err(e) if e.is_terminal() => {
                warn!("Provision rejected, not retrying until the object changes: {}", e);
                let reason = e.to_string();
                self.record_failure(key, obj, &reason).await;
                ReconcileOutcome::TerminalSkip(reason)
            }
            Err(e) => {
                warn!("Provision failed: {}", e);
                self.record_failure(key, obj, &e.to_string()).await;
                ReconcileOutcome::RetryableFailure(ReconcilerError::Provision(e))
            }
        }
    }
}
