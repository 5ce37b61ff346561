//! # Capabilities
//!
//! Kind-specific provision and cleanup logic plugged into the generic
//! reconciler, plus the static per-kind wiring.

use crate::controller::key::ManagedKind;
use crate::controller::wait::WaitError;
use async_trait::async_trait;
use kube::core::DynamicObject;
use std::sync::Arc;
use std::time::Duration;

/// Failures reported by a capability
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// The object's spec cannot be parsed; retrying will not help
    #[error("invalid object: {0}")]
    Conversion(String),
    /// The spec asks for something the controller refuses to do
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    /// A bounded wait gave up
    #[error("timed out {what} after {attempts} attempts ({elapsed:?})")]
    Timeout {
        what: String,
        attempts: u32,
        elapsed: Duration,
    },
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("{0}")]
    Other(String),
}

impl CapabilityError {
    /// True for errors that are not retried until the spec changes
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CapabilityError::Conversion(_) | CapabilityError::PolicyViolation(_)
        )
    }

    /// Map the result of a bounded wait, naming what was awaited
    pub fn from_wait(what: &str, err: WaitError<CapabilityError>) -> Self {
        match err {
            WaitError::Timeout { attempts, elapsed } => CapabilityError::Timeout {
                what: what.to_string(),
                attempts,
                elapsed,
            },
            WaitError::Failed(inner) => inner,
        }
    }
}

/// Kind-specific policy inputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    /// Namespaces the capability must refuse to write into
    pub blocked_namespaces: Vec<String>,
}

impl Policy {
    #[must_use]
    pub fn is_blocked(&self, namespace: &str) -> bool {
        self.blocked_namespaces.iter().any(|ns| ns == namespace)
    }
}

/// Provision and cleanup of the dependent resources of one kind
///
/// Both operations must be idempotent: the engine may invoke them again after
/// a partial failure or a missed status write. The engine never runs two
/// operations for the same object concurrently.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn provision(&self, obj: &DynamicObject, policy: &Policy) -> Result<(), CapabilityError>;

    async fn cleanup(&self, obj: &DynamicObject) -> Result<(), CapabilityError>;
}

/// Static configuration of one managed kind
#[derive(Clone)]
pub struct ControllerDescriptor {
    pub kind: ManagedKind,
    pub finalizer: String,
    pub capability: Arc<dyn Capability>,
    pub policy: Policy,
}

impl std::fmt::Debug for ControllerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerDescriptor")
            .field("kind", &self.kind)
            .field("finalizer", &self.finalizer)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ControllerDescriptor {
    /// Descriptor using the kind's standard finalizer
    #[must_use]
    pub fn new(kind: ManagedKind, capability: Arc<dyn Capability>, policy: Policy) -> Self {
        Self {
            kind,
            finalizer: kind.finalizer().to_string(),
            capability,
            policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(CapabilityError::Conversion("bad".into()).is_terminal());
        assert!(CapabilityError::PolicyViolation("blocked".into()).is_terminal());
        assert!(!CapabilityError::Other("boom".into()).is_terminal());
        assert!(!CapabilityError::Timeout {
            what: "token".into(),
            attempts: 3,
            elapsed: Duration::from_secs(3),
        }
        .is_terminal());
    }

    #[test]
    fn test_policy_blocks_listed_namespaces() {
        let policy = Policy {
            blocked_namespaces: vec!["kube-system".to_string()],
        };
        assert!(policy.is_blocked("kube-system"));
        assert!(!policy.is_blocked("argocd"));
    }

    #[test]
    fn test_from_wait_preserves_probe_error() {
        let err = CapabilityError::from_wait(
            "token",
            WaitError::Failed(CapabilityError::Other("denied".into())),
        );
        assert!(matches!(err, CapabilityError::Other(msg) if msg == "denied"));

        let err = CapabilityError::from_wait(
            "token",
            WaitError::Timeout {
                attempts: 10,
                elapsed: Duration::from_secs(15),
            },
        );
        assert!(matches!(err, CapabilityError::Timeout { attempts: 10, .. }));
    }
}
