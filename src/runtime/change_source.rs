//! # Change Source
//!
//! Watches every managed kind across all namespaces and turns watch events
//! into queue keys. Delivery is at-least-once: a periodic resync re-enqueues
//! every known key so missed events still converge.
//!
//! [`InitialSync`] records which kinds have finished their first list; the
//! controller only reports ready once every kind has.

use crate::controller::key::{ManagedKind, ReconcileKey};
use crate::runtime::worker_pool::Enqueue;
use futures::StreamExt;
use kube::api::Api;
use kube::core::DynamicObject;
use kube::Client;
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Kind of change observed for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

/// Fields of a watched object that decide whether an update matters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observed {
    pub generation: Option<i64>,
    pub deleting: bool,
}

impl Observed {
    #[must_use]
    pub fn of(obj: &DynamicObject) -> Self {
        Self {
            generation: obj.metadata.generation,
            deleting: obj.metadata.deletion_timestamp.is_some(),
        }
    }
}

/// Classify an apply event against what was last seen for the key
///
/// Updates are only reported when the generation moved or deletion was
/// requested; status and metadata-only writes are ignored.
#[must_use]
pub fn classify(previous: Option<Observed>, current: Observed) -> Option<ChangeKind> {
    match previous {
        None => Some(ChangeKind::Add),
        Some(prev) if prev.generation != current.generation => Some(ChangeKind::Update),
        Some(prev) if current.deleting && !prev.deleting => Some(ChangeKind::Update),
        Some(_) => None,
    }
}

/// Last observation of every key currently known to exist
#[derive(Debug, Default)]
struct KnownObjects {
    objects: Mutex<HashMap<ReconcileKey, Observed>>,
}

impl KnownObjects {
    fn observe(&self, key: ReconcileKey, current: Observed) -> Option<ChangeKind> {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = objects.insert(key, current);
        classify(previous, current)
    }

    fn forget(&self, key: &ReconcileKey) {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Drop keys of `kind` that were not seen during a relist
    fn retain_relisted(&self, kind: ManagedKind, seen: &HashSet<ReconcileKey>) -> Vec<ReconcileKey> {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        let vanished: Vec<ReconcileKey> = objects
            .keys()
            .filter(|key| key.kind == kind && !seen.contains(*key))
            .cloned()
            .collect();
        for key in &vanished {
            objects.remove(key);
        }
        vanished
    }

    fn keys(&self) -> Vec<ReconcileKey> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// Kinds still waiting for their first complete list
#[derive(Debug)]
pub struct InitialSync {
    pending: Mutex<BTreeSet<ManagedKind>>,
    synced: watch::Sender<bool>,
}

impl InitialSync {
    #[must_use]
    pub fn new(kinds: &[ManagedKind]) -> Self {
        let pending: BTreeSet<ManagedKind> = kinds.iter().copied().collect();
        let (synced, _) = watch::channel(pending.is_empty());
        Self {
            pending: Mutex::new(pending),
            synced,
        }
    }

    /// Record that `kind` finished listing; later relists are ignored
    pub fn mark_listed(&self, kind: ManagedKind) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.remove(&kind) {
            return;
        }
        info!(resource.kind = %kind, remaining = pending.len(), "Initial list complete");
        if pending.is_empty() {
            self.synced.send_replace(true);
        }
    }

    #[must_use]
    pub fn pending(&self) -> Vec<ManagedKind> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    #[must_use]
    pub fn is_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Resolve once every kind has been listed
    pub async fn wait(&self) {
        let mut synced = self.synced.subscribe();
        // The sender lives in `self`, so the channel cannot close while awaited
        let _ = synced.wait_for(|synced| *synced).await;
    }
}

/// Kubernetes watch based change source
pub struct KubeChangeSource {
    client: Client,
    kinds: Vec<ManagedKind>,
    resync_period: Duration,
    known: Arc<KnownObjects>,
    sync: Arc<InitialSync>,
}

impl std::fmt::Debug for KubeChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeChangeSource")
            .field("kinds", &self.kinds)
            .field("resync_period", &self.resync_period)
            .finish_non_exhaustive()
    }
}

impl KubeChangeSource {
    #[must_use]
    pub fn new(client: Client, kinds: Vec<ManagedKind>, resync_period: Duration) -> Self {
        Self {
            client,
            resync_period,
            known: Arc::new(KnownObjects::default()),
            sync: Arc::new(InitialSync::new(&kinds)),
            kinds,
        }
    }

    /// Handle reporting when every watched kind has been listed
    #[must_use]
    pub fn initial_sync(&self) -> Arc<InitialSync> {
        Arc::clone(&self.sync)
    }

    /// Feed changes into `enqueue` until `cancel` fires
    pub async fn run(self, cancel: CancellationToken, enqueue: Enqueue) {
        let mut tasks = JoinSet::new();
        for kind in self.kinds.iter().copied() {
            let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &kind.api_resource());
            tasks.spawn(watch_kind(
                kind,
                api,
                Arc::clone(&self.known),
                Arc::clone(&self.sync),
                Arc::clone(&enqueue),
                cancel.clone(),
            ));
        }
        tasks.spawn(resync(
            self.resync_period,
            Arc::clone(&self.known),
            Arc::clone(&enqueue),
            cancel.clone(),
        ));

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("Change source task failed: {}", e);
            }
        }
        info!("Change source stopped");
    }
}

async fn watch_kind(
    kind: ManagedKind,
    api: Api<DynamicObject>,
    known: Arc<KnownObjects>,
    sync: Arc<InitialSync>,
    enqueue: Enqueue,
    cancel: CancellationToken,
) {
    info!(resource.kind = %kind, "Starting watch");
    let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
    tokio::pin!(stream);

    // Keys seen during the current relist
    let mut relisted: Option<HashSet<ReconcileKey>> = None;

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = stream.next() => event,
        };
        let event = match event {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                warn!(resource.kind = %kind, "Watch error, backing off: {}", e);
                continue;
            }
            None => break,
        };

        match event {
            Event::Init => relisted = Some(HashSet::new()),
            Event::InitApply(obj) => {
                let key = ReconcileKey::for_object(kind, &obj);
                if let Some(seen) = relisted.as_mut() {
                    seen.insert(key.clone());
                }
                if let Some(change) = known.observe(key.clone(), Observed::of(&obj)) {
                    debug!(resource = %key, ?change, "Listed");
                    enqueue(key);
                }
            }
            Event::InitDone => {
                if let Some(seen) = relisted.take() {
                    // Deleted while the watch was down
                    for key in known.retain_relisted(kind, &seen) {
                        debug!(resource = %key, change = ?ChangeKind::Delete, "Vanished during relist");
                        enqueue(key);
                    }
                }
                sync.mark_listed(kind);
            }
            Event::Apply(obj) => {
                let key = ReconcileKey::for_object(kind, &obj);
                if let Some(change) = known.observe(key.clone(), Observed::of(&obj)) {
                    debug!(resource = %key, ?change, "Changed");
                    enqueue(key);
                }
            }
            Event::Delete(obj) => {
                let key = ReconcileKey::for_object(kind, &obj);
                known.forget(&key);
                debug!(resource = %key, change = ?ChangeKind::Delete, "Deleted");
                enqueue(key);
            }
        }
    }
    info!(resource.kind = %kind, "Watch stopped");
}

async fn resync(
    period: Duration,
    known: Arc<KnownObjects>,
    enqueue: Enqueue,
    cancel: CancellationToken,
) {
    if period.is_zero() {
        debug!("Resync disabled");
        return;
    }
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; the initial list covers it
    interval.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let keys = known.keys();
                debug!(count = keys.len(), "Resync");
                for key in keys {
                    enqueue(key);
                }
            }
        }
    }
}
