//! # Status Updater Integration Tests
//!
//! These tests verify:
//! - Bounded retries of conflicting status writes
//! - Optimistic concurrency on finalizer writes
//! - Skipping of unchanged status writes

mod common;

use argo_attach_controller::constants::STATUS_FIELD_MANAGER;
use argo_attach_controller::controller::key::{ManagedKind, ReconcileKey};
use argo_attach_controller::controller::store::{ObjectStore, StoreError};
use argo_attach_controller::controller::updater::{StatusUpdater, StatusWrite};
use argo_attach_controller::crd::{ManagedStatus, StatusState};
use common::{object, FakeStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const KIND: ManagedKind = ManagedKind::ArgoCluster;

fn updater(store: &Arc<FakeStore>) -> StatusUpdater {
    StatusUpdater::with_retry(
        Arc::clone(store) as Arc<dyn ObjectStore>,
        5,
        Duration::from_millis(100),
    )
}

fn conflict() -> StoreError {
    StoreError::Conflict("Operation cannot be fulfilled".to_string())
}

#[tokio::test(start_paused = true)]
async fn test_status_write_succeeds_on_fifth_attempt() {
    let store = FakeStore::new();
    let key = store.insert(KIND, object(KIND, "ns", "c", 1));
    for _ in 0..4 {
        store.fail_status(conflict());
    }
    let obj = store.object(&key).unwrap();

    let start = tokio::time::Instant::now();
    let result = updater(&store)
        .patch_status(&key, &obj, &ManagedStatus::ready(Some(1)))
        .await;

    assert_eq!(result.unwrap(), StatusWrite::Applied);
    assert_eq!(store.status_calls.load(Ordering::SeqCst), 5);
    assert_eq!(start.elapsed(), Duration::from_millis(400));
    assert_eq!(store.status(&key).unwrap().state, Some(StatusState::Ready));
}

#[tokio::test(start_paused = true)]
async fn test_status_write_gives_up_after_five_conflicts() {
    let store = FakeStore::new();
    let key = store.insert(KIND, object(KIND, "ns", "c", 1));
    for _ in 0..6 {
        store.fail_status(conflict());
    }
    let obj = store.object(&key).unwrap();

    let result = updater(&store)
        .patch_status(&key, &obj, &ManagedStatus::ready(Some(1)))
        .await;

    assert!(matches!(result, Err(StoreError::Conflict(_))));
    assert_eq!(store.status_calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_status_write_does_not_retry_other_errors() {
    let store = FakeStore::new();
    let key = store.insert(KIND, object(KIND, "ns", "c", 1));
    store.fail_status(StoreError::Other("forbidden".to_string()));
    let obj = store.object(&key).unwrap();

    let result = updater(&store)
        .patch_status(&key, &obj, &ManagedStatus::pending(Some(1)))
        .await;

    assert!(matches!(result, Err(StoreError::Other(_))));
    assert_eq!(store.status_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_status_write_on_missing_object_is_silent() {
    let store = FakeStore::new();
    let obj = object(KIND, "ns", "gone", 1);
    let key = ReconcileKey::for_object(KIND, &obj);

    let result = updater(&store)
        .patch_status(&key, &obj, &ManagedStatus::pending(Some(1)))
        .await;

    assert_eq!(result.unwrap(), StatusWrite::ObjectGone);
}

#[tokio::test]
async fn test_status_write_uses_status_field_manager() {
    let store = FakeStore::new();
    let key = store.insert(KIND, object(KIND, "ns", "c", 1));
    let obj = store.object(&key).unwrap();

    updater(&store)
        .patch_status(&key, &obj, &ManagedStatus::pending(Some(1)))
        .await
        .unwrap();

    let options = store.status_options.lock().unwrap();
    assert_eq!(options[0].field_owner, STATUS_FIELD_MANAGER);
    assert!(options[0].force);
}

#[tokio::test]
async fn test_unchanged_status_is_not_rewritten() {
    let store = FakeStore::new();
    let key = store.insert(KIND, object(KIND, "ns", "c", 1));
    let updater = updater(&store);

    let obj = store.object(&key).unwrap();
    updater
        .patch_status(&key, &obj, &ManagedStatus::ready(Some(1)))
        .await
        .unwrap();

    let obj = store.object(&key).unwrap();
    let result = updater
        .patch_status(&key, &obj, &ManagedStatus::ready(Some(1)))
        .await
        .unwrap();

    assert_eq!(result, StatusWrite::Unchanged);
    assert_eq!(store.status_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_finalizer_write_conflicts() {
    let store = FakeStore::new();
    let key = store.insert(KIND, object(KIND, "ns", "c", 1));
    let updater = updater(&store);
    let stale = store.object(&key).unwrap();

    // Someone else writes in between
    store.set_finalizers(&key, &["example.com/other"]);

    let result = updater
        .update_finalizers(&key, &stale, &["mine".to_string()])
        .await;

    assert!(matches!(result, Err(StoreError::Conflict(_))));
    assert_eq!(store.finalizers(&key), vec!["example.com/other"]);
}

#[tokio::test]
async fn test_fresh_finalizer_write_lands() {
    let store = FakeStore::new();
    let key = store.insert(KIND, object(KIND, "ns", "c", 1));
    let obj = store.object(&key).unwrap();

    let updated = updater(&store)
        .update_finalizers(&key, &obj, &["mine".to_string()])
        .await
        .unwrap();

    assert_eq!(updated.metadata.finalizers, Some(vec!["mine".to_string()]));
    assert_ne!(updated.metadata.resource_version, obj.metadata.resource_version);
}
