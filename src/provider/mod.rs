//! # Provider Modules
//!
//! Capabilities for the managed kinds. Each provider turns one custom
//! resource into an Argo CD cluster secret and removes it again on deletion.
//!
//! - `argo_cluster`: external clusters described by a kubeconfig secret
//! - `argo_namespace`: a single namespace of the local cluster
//! - `cluster_secret`: Argo CD cluster secret layout
//! - `kubeconfig`: credential extraction from kubeconfig documents
//! - `service_account`: service account, binding and token lifecycle

mod argo_cluster;
mod argo_namespace;
pub mod cluster_secret;
pub mod kubeconfig;
pub mod service_account;

pub use argo_cluster::ArgoClusterProvider;
pub use argo_namespace::ArgoNamespaceProvider;

use crate::constants::CONTROLLER_FIELD_MANAGER;
use crate::controller::capability::CapabilityError;
use kube::api::{Api, DeleteParams, PatchParams};
use kube::core::DynamicObject;
use kube::Resource;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, info};

/// Server-side apply parameters for dependent objects
pub(crate) fn apply_params() -> PatchParams {
    PatchParams::apply(CONTROLLER_FIELD_MANAGER).force()
}

/// Parse a dynamic object into its typed custom resource
pub(crate) fn parse_object<K>(obj: &DynamicObject) -> Result<K, CapabilityError>
where
    K: Resource + DeserializeOwned,
{
    obj.clone()
        .try_parse::<K>()
        .map_err(|e| CapabilityError::Conversion(e.to_string()))
}

/// Delete `name`, treating an already missing object as success
pub(crate) async fn delete_if_present<K>(api: &Api<K>, name: &str) -> Result<(), CapabilityError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!("Deleted {} {}", K::kind(&K::DynamicType::default()), name);
            Ok(())
        }
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
            debug!("{} {} already gone", K::kind(&K::DynamicType::default()), name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
