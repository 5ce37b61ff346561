//! # ArgoNamespace Provider
//!
//! Publishes one namespace of the local cluster to Argo CD, authenticated
//! with a service account token.

use crate::constants::{DEFAULT_SERVICE_ACCOUNT, IN_CLUSTER_SERVER};
use crate::controller::capability::{Capability, CapabilityError, Policy};
use crate::controller::wait::WaitPolicy;
use crate::crd::ArgoNamespace;
use crate::provider::cluster_secret::{self, ArgoConfig, ClusterSecret};
use crate::provider::{parse_object, service_account};
use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::info;

/// Argo CD cluster name used for `namespace`
#[must_use]
pub fn cluster_name(namespace: &str) -> String {
    format!("supervisor-ns-{namespace}")
}

/// Server address scoping the in-cluster API to `namespace`
#[must_use]
pub fn namespace_server(namespace: &str) -> String {
    format!("{IN_CLUSTER_SERVER}/?context={namespace}")
}

pub struct ArgoNamespaceProvider {
    client: Client,
    token_wait: WaitPolicy,
}

impl std::fmt::Debug for ArgoNamespaceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgoNamespaceProvider")
            .field("token_wait", &self.token_wait)
            .finish_non_exhaustive()
    }
}

impl ArgoNamespaceProvider {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            token_wait: WaitPolicy::service_account_token(),
        }
    }
}

/// An `ArgoNamespace` together with the identity it resolves to
#[derive(Debug)]
struct Target {
    resource: ArgoNamespace,
    namespace: String,
    service_account: String,
    /// The controller created the account and must clean it up
    owned: bool,
}

fn parse(obj: &DynamicObject) -> Result<Target, CapabilityError> {
    let resource: ArgoNamespace = parse_object(obj)?;
    if resource.spec.argo_namespace.is_empty() {
        return Err(CapabilityError::Conversion("spec.argoNamespace is empty".to_string()));
    }
    let namespace = resource.namespace().unwrap_or_default();
    let owned = resource.spec.service_account.is_empty();
    let service_account = if owned {
        DEFAULT_SERVICE_ACCOUNT.to_string()
    } else {
        resource.spec.service_account.clone()
    };
    Ok(Target {
        resource,
        namespace,
        service_account,
        owned,
    })
}

/// String data of the Argo CD cluster secret
pub fn secret_data(
    resource: &ArgoNamespace,
    namespace: &str,
    token: String,
) -> Result<BTreeMap<String, String>, CapabilityError> {
    let config = ArgoConfig::bearer_token(token).to_json()?;
    Ok(BTreeMap::from([
        ("name".to_string(), cluster_name(namespace)),
        ("server".to_string(), namespace_server(namespace)),
        ("project".to_string(), resource.spec.project.clone()),
        ("config".to_string(), config),
        ("namespaces".to_string(), namespace.to_string()),
    ]))
}

#[async_trait]
impl Capability for ArgoNamespaceProvider {
    async fn provision(&self, obj: &DynamicObject, _policy: &Policy) -> Result<(), CapabilityError> {
        let target = parse(obj)?;
        let spec = &target.resource.spec;

        if target.owned {
            service_account::ensure_default_service_account(&self.client, &target.namespace).await?;
        }
        let token = service_account::issue_token(
            &self.client,
            &target.namespace,
            &target.service_account,
            self.token_wait,
        )
        .await?;

        let name = cluster_name(&target.namespace);
        let data = secret_data(&target.resource, &target.namespace, token)?;
        ClusterSecret::new(&name, &spec.argo_namespace, &spec.cluster_labels, data)
            .apply(&self.client)
            .await?;
        info!(cluster = %name, "Namespace attached to Argo CD");
        Ok(())
    }

    async fn cleanup(&self, obj: &DynamicObject) -> Result<(), CapabilityError> {
        let target = parse(obj)?;
        service_account::delete_identity(
            &self.client,
            &target.namespace,
            &target.service_account,
            target.owned,
        )
        .await?;

        let name = cluster_name(&target.namespace);
        cluster_secret::delete(&self.client, &target.resource.spec.argo_namespace, &name).await?;
        info!(cluster = %name, "Namespace detached from Argo CD");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(spec: serde_json::Value) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "field.vmware.com/v1",
            "kind": "ArgoNamespace",
            "metadata": { "name": "attach", "namespace": "team-a", "generation": 1 },
            "spec": spec,
        }))
        .unwrap()
    }

    #[test]
    fn test_default_service_account_is_owned() {
        let target = parse(&object(json!({ "argoNamespace": "argocd" }))).unwrap();
        assert!(target.owned);
        assert_eq!(target.service_account, "argo-attach-sa");
        assert_eq!(target.namespace, "team-a");
    }

    #[test]
    fn test_named_service_account_is_not_owned() {
        let target = parse(&object(json!({
            "argoNamespace": "argocd",
            "serviceAccount": "deployer"
        })))
        .unwrap();
        assert!(!target.owned);
        assert_eq!(target.service_account, "deployer");
    }

    #[test]
    fn test_missing_argo_namespace_is_conversion_error() {
        let err = parse(&object(json!({ "project": "p" }))).unwrap_err();
        assert!(matches!(err, CapabilityError::Conversion(_)));
    }

    #[test]
    fn test_secret_data_layout() {
        let target = parse(&object(json!({ "argoNamespace": "argocd", "project": "team-a" }))).unwrap();
        let data = secret_data(&target.resource, &target.namespace, "tok".to_string()).unwrap();

        assert_eq!(data["name"], "supervisor-ns-team-a");
        assert_eq!(
            data["server"],
            "https://kubernetes.default.svc.cluster.local:443/?context=team-a"
        );
        assert_eq!(data["namespaces"], "team-a");
        assert_eq!(data["project"], "team-a");
        let config: serde_json::Value = serde_json::from_str(&data["config"]).unwrap();
        assert_eq!(config["bearerToken"], "tok");
        assert_eq!(config["tlsClientConfig"]["insecure"], true);
    }
}
