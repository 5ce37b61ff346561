//! # ArgoNamespace Spec

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ArgoNamespace Custom Resource Definition
///
/// Exposes the resource's own namespace to Argo CD as a namespace-scoped
/// cluster, authenticated with a service account token.
///
/// # Example
///
/// ```yaml
/// apiVersion: field.vmware.com/v1
/// kind: ArgoNamespace
/// metadata:
///   name: attach
///   namespace: team-a
/// spec:
///   argoNamespace: argocd
///   project: team-a
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ArgoNamespace",
    group = "field.vmware.com",
    version = "v1",
    namespaced,
    status = "crate::crd::ManagedStatus",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ArgoNamespaceSpec {
    /// Namespace Argo CD runs in; receives the cluster secret
    pub argo_namespace: String,
    /// Extra labels copied onto the Argo CD cluster secret
    #[serde(default)]
    pub cluster_labels: BTreeMap<String, String>,
    /// Argo CD project the namespace is scoped to
    #[serde(default)]
    pub project: String,
    /// Existing service account to authenticate with
    /// When empty the controller creates `argo-attach-sa` bound to the `edit` ClusterRole
    #[serde(default)]
    pub service_account: String,
}
