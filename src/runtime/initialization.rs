//! # Initialization
//!
//! Builds the controller from a Kubernetes client and configuration: one
//! reconciler per managed kind sharing a single object store, a runtime
//! owning the queue, and a change source watching every kind.

use crate::config::ControllerConfig;
use crate::controller::capability::{Capability, ControllerDescriptor, Policy};
use crate::controller::key::ManagedKind;
use crate::controller::reconciler::Reconciler;
use crate::controller::store::{KubeObjectStore, ObjectStore};
use crate::controller::updater::StatusUpdater;
use crate::provider::{ArgoClusterProvider, ArgoNamespaceProvider};
use crate::runtime::{ControllerRuntime, KubeChangeSource};
use kube::Client;
use std::sync::Arc;
use tracing::info;

/// Components ready to be run by the binary
pub struct InitializationResult {
    pub runtime: Arc<ControllerRuntime>,
    pub change_source: KubeChangeSource,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("runtime", &self.runtime)
            .field("change_source", &self.change_source)
            .finish()
    }
}

/// Static descriptors for every managed kind
///
/// The namespace denylist only constrains `ArgoCluster`.
#[must_use]
pub fn descriptors(client: &Client, config: &ControllerConfig) -> Vec<ControllerDescriptor> {
    ManagedKind::ALL
        .into_iter()
        .map(|kind| {
            let (capability, policy): (Arc<dyn Capability>, Policy) = match kind {
                ManagedKind::ArgoCluster => (
                    Arc::new(ArgoClusterProvider::new(client.clone())),
                    Policy {
                        blocked_namespaces: config.blocked_namespaces.clone(),
                    },
                ),
                ManagedKind::ArgoNamespace => (
                    Arc::new(ArgoNamespaceProvider::new(client.clone())),
                    Policy::default(),
                ),
            };
            ControllerDescriptor::new(kind, capability, policy)
        })
        .collect()
}

/// Assemble reconcilers around `store`
#[must_use]
pub fn build_runtime(
    store: Arc<dyn ObjectStore>,
    descriptors: Vec<ControllerDescriptor>,
    config: &ControllerConfig,
) -> ControllerRuntime {
    let reconcilers = descriptors
        .into_iter()
        .map(|descriptor| {
            let updater = StatusUpdater::new(Arc::clone(&store), config);
            Reconciler::new(descriptor, Arc::clone(&store), updater)
        })
        .collect();
    ControllerRuntime::new(config, reconcilers)
}

/// Build the controller against a live cluster
#[must_use]
pub fn initialize(client: Client, config: &ControllerConfig) -> InitializationResult {
    let store: Arc<dyn ObjectStore> = Arc::new(KubeObjectStore::new(client.clone()));
    let runtime = build_runtime(store, descriptors(&client, config), config);
    let change_source =
        KubeChangeSource::new(client, ManagedKind::ALL.to_vec(), config.resync_period());

    info!(
        workers = config.workers,
        resync_period_secs = config.resync_period_secs,
        blocked_namespaces = ?config.blocked_namespaces,
        "Controller initialized"
    );

    InitializationResult {
        runtime: Arc::new(runtime),
        change_source,
    }
}
