//! Common test utilities for controller integration tests
//!
//! Provides an in-memory `ObjectStore` that behaves like the API server for
//! the operations the controller uses, and a capability that records calls.

#![allow(dead_code, reason = "Not every test binary uses every helper")]

use argo_attach_controller::controller::capability::{
    Capability, CapabilityError, ControllerDescriptor, Policy,
};
use argo_attach_controller::controller::key::{ManagedKind, ReconcileKey};
use argo_attach_controller::controller::reconciler::Reconciler;
use argo_attach_controller::controller::store::{ApplyOptions, ObjectStore, StoreError};
use argo_attach_controller::controller::updater::{current_status, StatusUpdater};
use argo_attach_controller::crd::ManagedStatus;
use async_trait::async_trait;
use kube::core::DynamicObject;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Build a managed object with the given generation and no finalizers
pub fn object(kind: ManagedKind, namespace: &str, name: &str, generation: i64) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": kind.api_version(),
        "kind": kind.as_str(),
        "metadata": {
            "name": name,
            "namespace": namespace,
            "generation": generation,
            "resourceVersion": "1",
            "uid": format!("uid-{name}"),
        },
        "spec": {
            "clusterName": name,
            "argoNamespace": "argocd",
        },
    }))
    .expect("test object must deserialize")
}

/// In-memory object store
///
/// - Finalizer patches carrying a stale `resourceVersion` fail with a conflict
/// - Every successful write bumps `resourceVersion`
/// - A deleting object whose finalizer list becomes empty is removed
/// - Errors queued with the `fail_*` helpers are returned before any real work
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<ReconcileKey, DynamicObject>>,
    get_errors: Mutex<VecDeque<StoreError>>,
    patch_errors: Mutex<VecDeque<StoreError>>,
    status_errors: Mutex<VecDeque<StoreError>>,
    pub get_calls: AtomicUsize,
    pub patch_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub status_options: Mutex<Vec<ApplyOptions>>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, kind: ManagedKind, obj: DynamicObject) -> ReconcileKey {
        let key = ReconcileKey::for_object(kind, &obj);
        self.objects.lock().unwrap().insert(key.clone(), obj);
        key
    }

    pub fn object(&self, key: &ReconcileKey) -> Option<DynamicObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn finalizers(&self, key: &ReconcileKey) -> Vec<String> {
        self.object(key)
            .and_then(|obj| obj.metadata.finalizers)
            .unwrap_or_default()
    }

    pub fn status(&self, key: &ReconcileKey) -> Option<ManagedStatus> {
        self.object(key).as_ref().and_then(current_status)
    }

    /// Request deletion the way the API server does for guarded objects
    pub fn mark_deleting(&self, key: &ReconcileKey) {
        self.edit(key, |value| {
            value["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
        });
    }

    /// Simulate a spec change
    pub fn bump_generation(&self, key: &ReconcileKey) {
        self.edit(key, |value| {
            let generation = value["metadata"]["generation"].as_i64().unwrap_or(0);
            value["metadata"]["generation"] = json!(generation + 1);
        });
    }

    pub fn set_finalizers(&self, key: &ReconcileKey, finalizers: &[&str]) {
        self.edit(key, |value| {
            value["metadata"]["finalizers"] = json!(finalizers);
        });
    }

    pub fn fail_get(&self, err: StoreError) {
        self.get_errors.lock().unwrap().push_back(err);
    }

    pub fn fail_patch(&self, err: StoreError) {
        self.patch_errors.lock().unwrap().push_back(err);
    }

    pub fn fail_status(&self, err: StoreError) {
        self.status_errors.lock().unwrap().push_back(err);
    }

    fn edit(&self, key: &ReconcileKey, f: impl FnOnce(&mut Value)) {
        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get_mut(key).expect("object must exist");
        let mut value = serde_json::to_value(&*obj).unwrap();
        f(&mut value);
        bump_resource_version(&mut value);
        *obj = serde_json::from_value(value).unwrap();
    }
}

fn bump_resource_version(value: &mut Value) {
    let rv: u64 = value["metadata"]["resourceVersion"]
        .as_str()
        .and_then(|rv| rv.parse().ok())
        .unwrap_or(0);
    value["metadata"]["resourceVersion"] = json!((rv + 1).to_string());
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get(&self, key: &ReconcileKey) -> Result<DynamicObject, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.get_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.object(key).ok_or(StoreError::NotFound)
    }

    async fn patch_merge(
        &self,
        key: &ReconcileKey,
        patch: &Value,
    ) -> Result<DynamicObject, StoreError> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.patch_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get(key).ok_or(StoreError::NotFound)?;
        let mut value = serde_json::to_value(obj).unwrap();

        if let Some(expected) = patch["metadata"]["resourceVersion"].as_str() {
            if value["metadata"]["resourceVersion"].as_str() != Some(expected) {
                return Err(StoreError::Conflict(
                    "the object has been modified".to_string(),
                ));
            }
        }
        if let Some(finalizers) = patch["metadata"].get("finalizers") {
            value["metadata"]["finalizers"] = finalizers.clone();
        }
        bump_resource_version(&mut value);
        let updated: DynamicObject = serde_json::from_value(value).unwrap();

        let released = updated.metadata.deletion_timestamp.is_some()
            && updated
                .metadata
                .finalizers
                .as_ref()
                .is_none_or(Vec::is_empty);
        if released {
            objects.remove(key);
        } else {
            objects.insert(key.clone(), updated.clone());
        }
        Ok(updated)
    }

    async fn apply_status(
        &self,
        key: &ReconcileKey,
        payload: &Value,
        options: &ApplyOptions,
    ) -> Result<(), StoreError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status_options.lock().unwrap().push(options.clone());
        if let Some(err) = self.status_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get_mut(key).ok_or(StoreError::NotFound)?;
        let mut value = serde_json::to_value(&*obj).unwrap();
        value["status"] = payload["status"].clone();
        bump_resource_version(&mut value);
        *obj = serde_json::from_value(value).unwrap();
        Ok(())
    }
}

/// Capability that counts calls and replays scripted results
///
/// Tracks how many operations run concurrently per object name.
#[derive(Default)]
pub struct RecordingCapability {
    pub provision_calls: AtomicUsize,
    pub cleanup_calls: AtomicUsize,
    provision_results: Mutex<VecDeque<Result<(), CapabilityError>>>,
    cleanup_results: Mutex<VecDeque<Result<(), CapabilityError>>>,
    delay: Mutex<Duration>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: Mutex<HashMap<String, usize>>,
}

impl RecordingCapability {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let capability = Self::default();
        *capability.delay.lock().unwrap() = delay;
        Arc::new(capability)
    }

    pub fn provisions(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanup_calls.load(Ordering::SeqCst)
    }

    pub fn fail_provision(&self, err: CapabilityError) {
        self.provision_results.lock().unwrap().push_back(Err(err));
    }

    pub fn fail_cleanup(&self, err: CapabilityError) {
        self.cleanup_results.lock().unwrap().push_back(Err(err));
    }

    /// Highest number of overlapping operations seen for one object
    pub fn max_concurrency(&self, name: &str) -> usize {
        self.max_in_flight
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    async fn track(&self, obj: &DynamicObject) {
        let name = obj.metadata.name.clone().unwrap_or_default();
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let current = in_flight.entry(name.clone()).or_insert(0);
            *current += 1;
            let mut max = self.max_in_flight.lock().unwrap();
            let seen = max.entry(name.clone()).or_insert(0);
            *seen = (*seen).max(*current);
        }
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(current) = self.in_flight.lock().unwrap().get_mut(&name) {
            *current -= 1;
        }
    }
}

#[async_trait]
impl Capability for RecordingCapability {
    async fn provision(&self, obj: &DynamicObject, _policy: &Policy) -> Result<(), CapabilityError> {
        self.provision_calls.fetch_add(1, Ordering::SeqCst);
        self.track(obj).await;
        self.provision_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn cleanup(&self, obj: &DynamicObject) -> Result<(), CapabilityError> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        self.track(obj).await;
        self.cleanup_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

/// Reconciler for `kind` over `store`, with a fast status retry delay
pub fn reconciler(
    kind: ManagedKind,
    store: &Arc<FakeStore>,
    capability: &Arc<RecordingCapability>,
) -> Reconciler {
    let store: Arc<dyn ObjectStore> = Arc::clone(store) as Arc<dyn ObjectStore>;
    let capability: Arc<dyn Capability> = Arc::clone(capability) as Arc<dyn Capability>;
    let descriptor = ControllerDescriptor::new(kind, capability, Policy::default());
    let updater = StatusUpdater::with_retry(Arc::clone(&store), 5, Duration::from_millis(100));
    Reconciler::new(descriptor, store, updater)
}
