//! # ArgoCluster Provider
//!
//! Publishes an external workload cluster to Argo CD using the client
//! certificate from its admin kubeconfig.

use crate::controller::capability::{Capability, CapabilityError, Policy};
use crate::crd::ArgoCluster;
use crate::provider::cluster_secret::{self, ArgoConfig, ClusterSecret};
use crate::provider::kubeconfig::ClusterCredentials;
use crate::provider::parse_object;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::core::DynamicObject;
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::info;

/// Key of the kubeconfig document inside `<clusterName>-kubeconfig`
const KUBECONFIG_KEY: &str = "value";

/// Name of the secret holding the admin kubeconfig of `cluster_name`
#[must_use]
pub fn kubeconfig_secret_name(cluster_name: &str) -> String {
    format!("{cluster_name}-kubeconfig")
}

pub struct ArgoClusterProvider {
    client: Client,
}

impl std::fmt::Debug for ArgoClusterProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgoClusterProvider").finish_non_exhaustive()
    }
}

impl ArgoClusterProvider {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn read_kubeconfig(&self, namespace: &str, cluster_name: &str) -> Result<Vec<u8>, CapabilityError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let name = kubeconfig_secret_name(cluster_name);
        let secret = match secrets.get(&name).await {
            Ok(secret) => secret,
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                return Err(CapabilityError::Other(format!(
                    "kubeconfig secret {namespace}/{name} not found"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        secret
            .data
            .and_then(|mut data| data.remove(KUBECONFIG_KEY))
            .map(|value| value.0)
            .ok_or_else(|| {
                CapabilityError::Other(format!(
                    "{KUBECONFIG_KEY} does not exist in kubeconfig secret {namespace}/{name}"
                ))
            })
    }
}

/// Validated view of an `ArgoCluster`
fn parse(obj: &DynamicObject) -> Result<ArgoCluster, CapabilityError> {
    let cluster: ArgoCluster = parse_object(obj)?;
    if cluster.spec.cluster_name.is_empty() {
        return Err(CapabilityError::Conversion("spec.clusterName is empty".to_string()));
    }
    if cluster.spec.argo_namespace.is_empty() {
        return Err(CapabilityError::Conversion("spec.argoNamespace is empty".to_string()));
    }
    Ok(cluster)
}

/// String data of the Argo CD cluster secret
pub fn secret_data(
    cluster: &ArgoCluster,
    credentials: ClusterCredentials,
) -> Result<BTreeMap<String, String>, CapabilityError> {
    let config = ArgoConfig::client_certificate(
        credentials.ca_data,
        credentials.cert_data,
        credentials.key_data,
    )
    .to_json()?;
    Ok(BTreeMap::from([
        ("name".to_string(), cluster.spec.cluster_name.clone()),
        ("server".to_string(), credentials.server),
        ("clusterResources".to_string(), "true".to_string()),
        ("project".to_string(), cluster.spec.project.clone()),
        ("config".to_string(), config),
    ]))
}

#[async_trait]
impl Capability for ArgoClusterProvider {
    async fn provision(&self, obj: &DynamicObject, policy: &Policy) -> Result<(), CapabilityError> {
        let cluster = parse(obj)?;
        let spec = &cluster.spec;
        if policy.is_blocked(&spec.argo_namespace) {
            return Err(CapabilityError::PolicyViolation(format!(
                "argoNamespace {} is in the list of blocked namespaces",
                spec.argo_namespace
            )));
        }

        let namespace = cluster.namespace().unwrap_or_default();
        let raw = self.read_kubeconfig(&namespace, &spec.cluster_name).await?;
        let credentials = ClusterCredentials::from_kubeconfig(&raw, &spec.cluster_name)?;
        let data = secret_data(&cluster, credentials)?;

        ClusterSecret::new(&spec.cluster_name, &spec.argo_namespace, &spec.cluster_labels, data)
            .apply(&self.client)
            .await?;
        info!(cluster = %spec.cluster_name, "Cluster attached to Argo CD");
        Ok(())
    }

    async fn cleanup(&self, obj: &DynamicObject) -> Result<(), CapabilityError> {
        let cluster = parse(obj)?;
        cluster_secret::delete(&self.client, &cluster.spec.argo_namespace, &cluster.spec.cluster_name)
            .await?;
        info!(cluster = %cluster.spec.cluster_name, "Cluster detached from Argo CD");
        Ok(())
    }
}
