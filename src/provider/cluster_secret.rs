//! # Argo CD Cluster Secrets
//!
//! Argo CD discovers clusters through secrets labelled
//! `argocd.argoproj.io/secret-type: cluster` whose string data carries the
//! server address and a JSON connection config.

use crate::constants::ARGO_SECRET_TYPE_LABEL;
use crate::controller::capability::CapabilityError;
use crate::provider::{apply_params, delete_if_present};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch};
use kube::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// TLS settings of an Argo CD cluster connection
///
/// Certificate and key fields hold base64-encoded PEM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsClientConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ca_data: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cert_data: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key_data: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
}

/// The `config` entry of an Argo CD cluster secret
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgoConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_client_config: Option<TlsClientConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl ArgoConfig {
    /// Client certificate authentication against a verified server
    #[must_use]
    pub fn client_certificate(ca_data: String, cert_data: String, key_data: String) -> Self {
        Self {
            tls_client_config: Some(TlsClientConfig {
                ca_data,
                cert_data,
                key_data,
                insecure: false,
            }),
            bearer_token: None,
        }
    }

    /// Bearer token authentication without server verification
    #[must_use]
    pub fn bearer_token(token: String) -> Self {
        Self {
            tls_client_config: Some(TlsClientConfig {
                insecure: true,
                ..TlsClientConfig::default()
            }),
            bearer_token: Some(token),
        }
    }

    pub fn to_json(&self) -> Result<String, CapabilityError> {
        serde_json::to_string(self)
            .map_err(|e| CapabilityError::Other(format!("unable to encode argo config: {e}")))
    }
}

/// Name of the cluster secret published for `cluster_name`
#[must_use]
pub fn secret_name(cluster_name: &str) -> String {
    format!("{cluster_name}-argo-cluster")
}

/// Desired state of one Argo CD cluster secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSecret {
    pub cluster_name: String,
    /// Namespace Argo CD runs in
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

impl ClusterSecret {
    /// Secret for `cluster_name` in `namespace`
    ///
    /// `labels` are user supplied; the Argo CD discovery label is always set.
    #[must_use]
    pub fn new(
        cluster_name: &str,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        let mut labels = labels.clone();
        labels.insert(ARGO_SECRET_TYPE_LABEL.to_string(), "cluster".to_string());
        Self {
            cluster_name: cluster_name.to_string(),
            namespace: namespace.to_string(),
            labels,
            data,
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        secret_name(&self.cluster_name)
    }

    /// Typed manifest sent with server-side apply
    #[must_use]
    pub fn to_secret(&self) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(self.name()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.labels.clone()),
                ..ObjectMeta::default()
            },
            string_data: Some(self.data.clone()),
            type_: Some("Opaque".to_string()),
            ..Secret::default()
        }
    }

    /// Create or update the secret
    pub async fn apply(&self, client: &Client) -> Result<(), CapabilityError> {
        let secrets: Api<Secret> = Api::namespaced(client.clone(), &self.namespace);
        let name = self.name();
        secrets
            .patch(&name, &apply_params(), &Patch::Apply(&self.to_secret()))
            .await?;
        info!("Applied argo cluster secret {}/{}", self.namespace, name);
        Ok(())
    }
}

/// Remove the cluster secret of `cluster_name` from `namespace`
pub async fn delete(client: &Client, namespace: &str, cluster_name: &str) -> Result<(), CapabilityError> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    delete_if_present(&secrets, &secret_name(cluster_name)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_certificate_config_json() {
        let config = ArgoConfig::client_certificate("Y2E=".into(), "Y2VydA==".into(), "a2V5".into());
        let value: serde_json::Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "tlsClientConfig": {
                    "caData": "Y2E=",
                    "certData": "Y2VydA==",
                    "keyData": "a2V5"
                }
            })
        );
    }

    #[test]
    fn test_bearer_token_config_json() {
        let config = ArgoConfig::bearer_token("abc".into());
        let value: serde_json::Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "tlsClientConfig": { "insecure": true },
                "bearerToken": "abc"
            })
        );
    }

    #[test]
    fn test_cluster_secret_adds_discovery_label() {
        let labels = BTreeMap::from([("env".to_string(), "dev".to_string())]);
        let data = BTreeMap::from([("name".to_string(), "workload-1".to_string())]);
        let secret = ClusterSecret::new("workload-1", "argocd", &labels, data).to_secret();

        assert_eq!(secret.metadata.name.as_deref(), Some("workload-1-argo-cluster"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("argocd"));
        let labels = secret.metadata.labels.unwrap();
        assert_eq!(labels.get("env").map(String::as_str), Some("dev"));
        assert_eq!(
            labels.get("argocd.argoproj.io/secret-type").map(String::as_str),
            Some("cluster")
        );
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(
            secret.string_data.unwrap().get("name").map(String::as_str),
            Some("workload-1")
        );
    }

    #[test]
    fn test_user_labels_cannot_override_discovery_label() {
        let labels = BTreeMap::from([(
            "argocd.argoproj.io/secret-type".to_string(),
            "repository".to_string(),
        )]);
        let secret = ClusterSecret::new("c", "argocd", &labels, BTreeMap::new());
        assert_eq!(
            secret.labels.get("argocd.argoproj.io/secret-type").map(String::as_str),
            Some("cluster")
        );
    }

    #[test]
    fn test_manifest_serializes_type_meta() {
        let secret = ClusterSecret::new("c", "argocd", &BTreeMap::new(), BTreeMap::new()).to_secret();
        let value = serde_json::to_value(&secret).unwrap();
        assert_eq!(value["apiVersion"], "v1");
        assert_eq!(value["kind"], "Secret");
    }
}
