//! # ArgoCluster Spec
//!
//! Registers an externally provisioned workload cluster with Argo CD.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ArgoCluster Custom Resource Definition
///
/// The controller reads the cluster's `<clusterName>-kubeconfig` secret from
/// the resource namespace and publishes an Argo CD cluster secret into
/// `argoNamespace`.
///
/// # Example
///
/// ```yaml
/// apiVersion: field.vmware.com/v1
/// kind: ArgoCluster
/// metadata:
///   name: workload-1
///   namespace: team-a
/// spec:
///   clusterName: workload-1
///   argoNamespace: argocd
///   project: team-a
///   clusterLabels:
///     env: dev
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ArgoCluster",
    group = "field.vmware.com",
    version = "v1",
    namespaced,
    status = "crate::crd::ManagedStatus",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ArgoClusterSpec {
    /// Name of the workload cluster, also the prefix of its kubeconfig secret
    pub cluster_name: String,
    /// Namespace Argo CD runs in; receives the cluster secret
    pub argo_namespace: String,
    /// Extra labels copied onto the Argo CD cluster secret
    #[serde(default)]
    pub cluster_labels: BTreeMap<String, String>,
    /// Argo CD project the cluster is scoped to
    #[serde(default)]
    pub project: String,
}
