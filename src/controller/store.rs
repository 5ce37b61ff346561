//! # Object Store
//!
//! Narrow view of the API server used by the reconciler and the status
//! updater. The kube implementation addresses every managed kind through
//! `Api<DynamicObject>`; tests substitute an in-memory fake.

use crate::controller::key::ReconcileKey;
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::core::DynamicObject;
use kube::Client;
use serde_json::Value;

/// Store errors, classified the way the reconciler reacts to them
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object does not exist (404)
    #[error("object not found")]
    NotFound,
    /// Optimistic concurrency failure or concurrent create (409)
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound,
            // Covers both "Conflict" and "AlreadyExists" reasons
            kube::Error::Api(api_err) if api_err.code == 409 => {
                StoreError::Conflict(api_err.message)
            }
            other => StoreError::Other(other.to_string()),
        }
    }
}

/// Options for a server-side apply of the status subresource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    pub field_owner: String,
    pub force: bool,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the latest version of the object
    async fn get(&self, key: &ReconcileKey) -> Result<DynamicObject, StoreError>;

    /// Apply a JSON merge patch to the object's main resource
    async fn patch_merge(
        &self,
        key: &ReconcileKey,
        patch: &Value,
    ) -> Result<DynamicObject, StoreError>;

    /// Server-side apply `payload` to the status subresource
    async fn apply_status(
        &self,
        key: &ReconcileKey,
        payload: &Value,
        options: &ApplyOptions,
    ) -> Result<(), StoreError>;
}

/// `ObjectStore` backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ReconcileKey) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            &key.namespace,
            &key.kind.api_resource(),
        )
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, key: &ReconcileKey) -> Result<DynamicObject, StoreError> {
        Ok(self.api(key).get(&key.name).await?)
    }

    async fn patch_merge(
        &self,
        key: &ReconcileKey,
        patch: &Value,
    ) -> Result<DynamicObject, StoreError> {
        Ok(self
            .api(key)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn apply_status(
        &self,
        key: &ReconcileKey,
        payload: &Value,
        options: &ApplyOptions,
    ) -> Result<(), StoreError> {
        let mut params = PatchParams::apply(&options.field_owner);
        if options.force {
            params = params.force();
        }
        self.api(key)
            .patch_status(&key.name, &params, &Patch::Apply(payload))
            .await?;
        Ok(())
    }
}
