//! # Types
//!
//! Core types for the reconciler.

use crate::controller::capability::CapabilityError;
use crate::controller::store::StoreError;
use kube::core::DynamicObject;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to fetch object: {0}")]
    Fetch(#[source] StoreError),
    #[error("failed to write finalizers: {0}")]
    Finalizers(#[source] StoreError),
    #[error("failed to write status: {0}")]
    Status(#[source] StoreError),
    #[error("provision failed: {0}")]
    Provision(#[source] CapabilityError),
    #[error("cleanup failed: {0}")]
    Cleanup(#[source] CapabilityError),
}

impl ReconcilerError {
    /// Short label used for metrics and log fields
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Fetch(_) => "fetch",
            ReconcilerError::Finalizers(StoreError::Conflict(_))
            | ReconcilerError::Status(StoreError::Conflict(_)) => "conflict",
            ReconcilerError::Finalizers(_) => "finalizers",
            ReconcilerError::Status(_) => "status",
            ReconcilerError::Provision(CapabilityError::Timeout { .. })
            | ReconcilerError::Cleanup(CapabilityError::Timeout { .. }) => "timeout",
            ReconcilerError::Provision(_) => "provision",
            ReconcilerError::Cleanup(_) => "cleanup",
        }
    }
}

/// Classified result of one reconcile pass
///
/// Every pass ends in exactly one of these; the worker pool maps them onto
/// queue operations.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Converged; nothing to do until the next change
    Success,
    /// One step converged; process the key again without counting a failure
    Requeue,
    /// Transient failure; retry with backoff
    RetryableFailure(ReconcilerError),
    /// Retrying cannot help until the object changes
    TerminalSkip(String),
}

impl ReconcileOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Success => "success",
            ReconcileOutcome::Requeue => "requeue",
            ReconcileOutcome::RetryableFailure(_) => "retryable_failure",
            ReconcileOutcome::TerminalSkip(_) => "terminal_skip",
        }
    }
}

/// Where a freshly fetched object sits in the finalizer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectPhase {
    /// Deletion requested and our finalizer still guards it
    Deleting,
    /// Deletion requested and our finalizer is already gone
    Released,
    /// Live object not yet carrying our finalizer
    Pending,
    /// Live object carrying our finalizer
    Provisioning,
}

impl ObjectPhase {
    #[must_use]
    pub fn of(obj: &DynamicObject, finalizer: &str) -> Self {
        let has_finalizer = obj
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|fs| fs.iter().any(|f| f == finalizer));
        match (obj.metadata.deletion_timestamp.is_some(), has_finalizer) {
            (true, true) => ObjectPhase::Deleting,
            (true, false) => ObjectPhase::Released,
            (false, false) => ObjectPhase::Pending,
            (false, true) => ObjectPhase::Provisioning,
        }
    }
}
