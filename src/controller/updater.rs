//! # Status and Finalizer Updater
//!
//! Writes the two fields the controller owns on a managed object.
//!
//! - Finalizers are written as a full list through a JSON merge patch that
//!   carries the object's `resourceVersion`, so the API server rejects the
//!   write with a conflict if the object changed since it was read.
//! - Status is written with server-side apply on the status subresource,
//!   retried a bounded number of times on conflict.

use crate::config::ControllerConfig;
use crate::constants::STATUS_FIELD_MANAGER;
use crate::controller::key::ReconcileKey;
use crate::controller::store::{ApplyOptions, ObjectStore, StoreError};
use crate::crd::ManagedStatus;
use crate::observability;
use kube::core::DynamicObject;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    /// The status subresource was applied
    Applied,
    /// The recorded status already matched; nothing was written
    Unchanged,
    /// The object disappeared before the write landed
    ObjectGone,
}

pub struct StatusUpdater {
    store: Arc<dyn ObjectStore>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for StatusUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusUpdater")
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl StatusUpdater {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, config: &ControllerConfig) -> Self {
        Self::with_retry(
            store,
            config.status_retry_attempts,
            config.status_retry_delay(),
        )
    }

    #[must_use]
    pub fn with_retry(store: Arc<dyn ObjectStore>, retry_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            store,
            retry_attempts: retry_attempts.max(1),
            retry_delay,
        }
    }

    /// Replace the object's finalizer list
    ///
    /// Fails with `StoreError::Conflict` when `obj` is stale.
    pub async fn update_finalizers(
        &self,
        key: &ReconcileKey,
        obj: &DynamicObject,
        finalizers: &[String],
    ) -> Result<DynamicObject, StoreError> {
        let patch = finalizer_patch(obj, finalizers);
        debug!(resource = %key, ?finalizers, "Writing finalizers");
        self.store.patch_merge(key, &patch).await
    }

    /// Apply `status` to the object's status subresource
    ///
    /// Skips the write when the recorded status describes the same
    /// observation. A missing object is not an error.
    pub async fn patch_status(
        &self,
        key: &ReconcileKey,
        obj: &DynamicObject,
        status: &ManagedStatus,
    ) -> Result<StatusWrite, StoreError> {
        if current_status(obj).is_some_and(|current| current.same_observation(status)) {
            debug!(resource = %key, "Status unchanged, skipping write");
            return Ok(StatusWrite::Unchanged);
        }

        let payload = status_payload(key, status);
        let options = ApplyOptions {
            field_owner: STATUS_FIELD_MANAGER.to_string(),
            force: true,
        };

        let mut attempt = 1;
        loop {
            match self.store.apply_status(key, &payload, &options).await {
                Ok(()) => return Ok(StatusWrite::Applied),
                Err(StoreError::NotFound) => {
                    debug!(resource = %key, "Object gone before status write");
                    return Ok(StatusWrite::ObjectGone);
                }
                Err(StoreError::Conflict(message)) if attempt < self.retry_attempts => {
                    observability::metrics::increment_status_conflicts();
                    warn!(
                        resource = %key,
                        attempt,
                        max_attempts = self.retry_attempts,
                        "Status write conflicted, retrying: {}",
                        message
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_conflict() {
                        observability::metrics::increment_status_conflicts();
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Status currently recorded on the object, if it parses
#[must_use]
pub fn current_status(obj: &DynamicObject) -> Option<ManagedStatus> {
    obj.data
        .get("status")
        .and_then(|status| serde_json::from_value(status.clone()).ok())
}

fn finalizer_patch(obj: &DynamicObject, finalizers: &[String]) -> Value {
    let mut metadata = Map::new();
    metadata.insert("finalizers".to_string(), json!(finalizers));
    if let Some(rv) = &obj.metadata.resource_version {
        metadata.insert("resourceVersion".to_string(), json!(rv));
    }
    json!({ "metadata": metadata })
}

fn status_payload(key: &ReconcileKey, status: &ManagedStatus) -> Value {
    json!({
        "apiVersion": key.kind.api_version(),
        "kind": key.kind.as_str(),
        "metadata": {
            "name": key.name,
            "namespace": key.namespace,
        },
        "status": status,
    })
}
