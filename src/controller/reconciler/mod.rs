//! # Reconciler
//!
//! Kind-agnostic finalizer state machine.
//!
//! Each pass re-fetches the object by key and acts on what it finds:
//!
//! 1. **Deleting** - run cleanup, then drop our finalizer so deletion completes
//! 2. **Pending** - record our finalizer and a `Pending` status, then requeue
//! 3. **Provisioning** - provision dependent resources unless the status
//!    already records `Ready` for the current generation
//!
//! The reconciler keeps no state between passes; the object is the only
//! source of truth.

mod finalize;
mod provision;
pub mod types;

pub use types::{ObjectPhase, ReconcileOutcome, ReconcilerError};

use crate::controller::capability::ControllerDescriptor;
use crate::controller::key::ReconcileKey;
use crate::controller::store::{ObjectStore, StoreError};
use crate::controller::updater::StatusUpdater;
use crate::crd::ManagedStatus;
use kube::core::DynamicObject;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

pub struct Reconciler {
    descriptor: ControllerDescriptor,
    store: Arc<dyn ObjectStore>,
    updater: StatusUpdater,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("descriptor", &self.descriptor)
            .field("updater", &self.updater)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        descriptor: ControllerDescriptor,
        store: Arc<dyn ObjectStore>,
        updater: StatusUpdater,
    ) -> Self {
        Self {
            descriptor,
            store,
            updater,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &ControllerDescriptor {
        &self.descriptor
    }

    /// Run one pass for `key` against the latest version of the object
    pub async fn reconcile_key(&self, key: &ReconcileKey) -> ReconcileOutcome {
        let span = tracing::info_span!(
            "reconcile",
            resource.kind = %key.kind,
            resource.namespace = %key.namespace,
            resource.name = %key.name,
        );
        self.reconcile_inner(key).instrument(span).await
    }

    async fn reconcile_inner(&self, key: &ReconcileKey) -> ReconcileOutcome {
        let obj = match self.store.get(key).await {
            Ok(obj) => obj,
            Err(StoreError::NotFound) => {
                debug!("Object no longer exists, nothing to reconcile");
                return ReconcileOutcome::Success;
            }
            Err(e) => return ReconcileOutcome::RetryableFailure(ReconcilerError::Fetch(e)),
        };

        match ObjectPhase::of(&obj, &self.descriptor.finalizer) {
            ObjectPhase::Deleting => self.finalize(key, &obj).await,
            ObjectPhase::Released => {
                debug!("Deletion in progress without our finalizer, nothing to do");
                ReconcileOutcome::Success
            }
            ObjectPhase::Pending => self.attach(key, &obj).await,
            ObjectPhase::Provisioning => self.provision(key, &obj).await,
        }
    }

    /// Write `status`, surfacing failures to the caller
    async fn write_status(
        &self,
        key: &ReconcileKey,
        obj: &DynamicObject,
        status: &ManagedStatus,
    ) -> Result<(), ReconcilerError> {
        self.updater
            .patch_status(key, obj, status)
            .await
            .map(|_| ())
            .map_err(ReconcilerError::Status)
    }

    /// Write a `Failed` status on a path that already failed
    ///
    /// The original failure decides the outcome, so a failing status write is
    /// only logged.
    async fn record_failure(&self, key: &ReconcileKey, obj: &DynamicObject, cause: &str) {
        let status = ManagedStatus::failed(obj.metadata.generation, cause);
        if let Err(e) = self.write_status(key, obj, &status).await {
            warn!("Failed to record failure in status: {}", e);
        }
    }
}
