//! # Service Account Tokens
//!
//! Lifecycle of the identity Argo CD uses to reach a namespace: an optional
//! controller-owned service account bound to the `edit` ClusterRole, and a
//! long-lived token secret for whichever account is used.

use crate::constants::{DEFAULT_SERVICE_ACCOUNT, SERVICE_ACCOUNT_CLUSTER_ROLE};
use crate::controller::capability::CapabilityError;
use crate::controller::wait::{wait_for, WaitPolicy};
use crate::provider::{apply_params, delete_if_present};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, info};

const TOKEN_SECRET_TYPE: &str = "kubernetes.io/service-account-token";
const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";

/// Name of the token secret issued for `service_account`
#[must_use]
pub fn token_secret_name(service_account: &str) -> String {
    format!("{service_account}-token")
}

#[must_use]
pub fn service_account_manifest(namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(DEFAULT_SERVICE_ACCOUNT.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        ..ServiceAccount::default()
    }
}

#[must_use]
pub fn role_binding_manifest(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(DEFAULT_SERVICE_ACCOUNT.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: SERVICE_ACCOUNT_CLUSTER_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: DEFAULT_SERVICE_ACCOUNT.to_string(),
            namespace: Some(namespace.to_string()),
            ..Subject::default()
        }]),
    }
}

#[must_use]
pub fn token_secret_manifest(namespace: &str, service_account: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(token_secret_name(service_account)),
            namespace: Some(namespace.to_string()),
            annotations: Some(BTreeMap::from([(
                SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(),
                service_account.to_string(),
            )])),
            ..ObjectMeta::default()
        },
        type_: Some(TOKEN_SECRET_TYPE.to_string()),
        ..Secret::default()
    }
}

/// Token populated by the token controller, if any
pub fn token_from_secret(secret: &Secret) -> Result<Option<String>, CapabilityError> {
    let Some(token) = secret.data.as_ref().and_then(|data| data.get("token")) else {
        return Ok(None);
    };
    if token.0.is_empty() {
        return Ok(None);
    }
    String::from_utf8(token.0.clone())
        .map(Some)
        .map_err(|e| CapabilityError::Other(format!("service account token is not UTF-8: {e}")))
}

/// Create or update the controller-owned service account and its binding
pub async fn ensure_default_service_account(
    client: &Client,
    namespace: &str,
) -> Result<(), CapabilityError> {
    let accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    accounts
        .patch(
            DEFAULT_SERVICE_ACCOUNT,
            &apply_params(),
            &Patch::Apply(&service_account_manifest(namespace)),
        )
        .await?;
    info!("Applied ServiceAccount {}/{}", namespace, DEFAULT_SERVICE_ACCOUNT);

    let bindings: Api<RoleBinding> = Api::namespaced(client.clone(), namespace);
    bindings
        .patch(
            DEFAULT_SERVICE_ACCOUNT,
            &apply_params(),
            &Patch::Apply(&role_binding_manifest(namespace)),
        )
        .await?;
    info!("Applied RoleBinding {}/{}", namespace, DEFAULT_SERVICE_ACCOUNT);
    Ok(())
}

/// Issue a token secret for `service_account` and wait for it to be populated
pub async fn issue_token(
    client: &Client,
    namespace: &str,
    service_account: &str,
    policy: WaitPolicy,
) -> Result<String, CapabilityError> {
    let accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    match accounts.get(service_account).await {
        Ok(_) => {}
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
            return Err(CapabilityError::Other(format!(
                "service account {namespace}/{service_account} not found"
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let name = token_secret_name(service_account);
    secrets
        .patch(
            &name,
            &apply_params(),
            &Patch::Apply(&token_secret_manifest(namespace, service_account)),
        )
        .await?;
    info!("Applied token secret {}/{}", namespace, name);

    let (secrets_ref, name_ref) = (&secrets, name.as_str());
    wait_for(policy, || async move {
        match secrets_ref.get_opt(name_ref).await? {
            Some(secret) => token_from_secret(&secret),
            None => Ok(None),
        }
    })
    .await
    .map_err(|e| CapabilityError::from_wait(&format!("waiting for token secret {namespace}/{name}"), e))
}

/// Remove the token secret and, when the controller created it, the account
pub async fn delete_identity(
    client: &Client,
    namespace: &str,
    service_account: &str,
    owned: bool,
) -> Result<(), CapabilityError> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    delete_if_present(&secrets, &token_secret_name(service_account)).await?;

    if !owned {
        debug!("Service account {} is user supplied, keeping it", service_account);
        return Ok(());
    }
    let bindings: Api<RoleBinding> = Api::namespaced(client.clone(), namespace);
    delete_if_present(&bindings, service_account).await?;
    let accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    delete_if_present(&accounts, service_account).await
}
