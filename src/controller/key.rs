//! # Reconcile Keys
//!
//! Identity of a managed object as it travels through the queue.

use crate::constants::{API_GROUP, ARGO_CLUSTER_FINALIZER, ARGO_NAMESPACE_FINALIZER};
use crate::crd::{ArgoCluster, ArgoNamespace};
use kube::core::{ApiResource, DynamicObject};
use kube::ResourceExt;
use std::fmt;

/// Closed set of kinds the controller manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManagedKind {
    ArgoCluster,
    ArgoNamespace,
}

impl ManagedKind {
    /// All managed kinds, in registration order
    pub const ALL: [ManagedKind; 2] = [ManagedKind::ArgoCluster, ManagedKind::ArgoNamespace];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagedKind::ArgoCluster => "ArgoCluster",
            ManagedKind::ArgoNamespace => "ArgoNamespace",
        }
    }

    /// Finalizer token guarding cleanup for this kind
    #[must_use]
    pub fn finalizer(&self) -> &'static str {
        match self {
            ManagedKind::ArgoCluster => ARGO_CLUSTER_FINALIZER,
            ManagedKind::ArgoNamespace => ARGO_NAMESPACE_FINALIZER,
        }
    }

    /// Type information used to address the kind through `Api<DynamicObject>`
    #[must_use]
    pub fn api_resource(&self) -> ApiResource {
        match self {
            ManagedKind::ArgoCluster => ApiResource::erase::<ArgoCluster>(&()),
            ManagedKind::ArgoNamespace => ApiResource::erase::<ArgoNamespace>(&()),
        }
    }

    /// `apiVersion` written into server-side apply payloads
    #[must_use]
    pub fn api_version(&self) -> String {
        format!("{API_GROUP}/v1")
    }

    /// Resolve a kind name as found in `DynamicObject::types`
    #[must_use]
    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }
}

impl fmt::Display for ManagedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(kind, namespace, name)` identity used for queue dedup and lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReconcileKey {
    pub kind: ManagedKind,
    pub namespace: String,
    pub name: String,
}

impl ReconcileKey {
    pub fn new(kind: ManagedKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a fetched or watched object
    ///
    /// Cluster-scoped objects never reach the controller, so a missing
    /// namespace maps to the empty string.
    #[must_use]
    pub fn for_object(kind: ManagedKind, obj: &DynamicObject) -> Self {
        Self::new(kind, obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}
