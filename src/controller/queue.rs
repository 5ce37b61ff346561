//! # Work Queue
//!
//! Deduplicating, rate-limited queue of reconcile keys.
//!
//! A key is in at most one of two places at a time:
//!
//! - **queued**: waiting for a worker
//! - **processing**: handed out by `get` and not yet released with `done`
//!
//! Adding a key that is already queued is a no-op. Adding a key that is being
//! processed marks it dirty; `done` moves it back to the queue so the newer
//! change is observed by exactly one later pass. This gives per-key
//! serialization while different keys are processed in parallel.

use crate::controller::backoff::ExponentialBackoff;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct QueueState<K> {
    queue: VecDeque<K>,
    /// Keys that need processing, whether queued or waiting on an in-flight pass
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

impl<K> Default for QueueState<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            failures: HashMap::new(),
            shutting_down: false,
        }
    }
}

/// Called with the number of queued keys whenever it changes
pub type DepthObserver = Box<dyn Fn(usize) + Send + Sync>;

/// Work queue shared by the change source and the worker pool
pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    available: Notify,
    backoff: ExponentialBackoff,
    /// Cancels pending delayed adds on shutdown
    timers: CancellationToken,
    depth_observer: Option<DepthObserver>,
}

impl<K: std::fmt::Debug> std::fmt::Debug for WorkQueue<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("state", &self.state)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            backoff,
            timers: CancellationToken::new(),
            depth_observer: None,
        }
    }

    /// Report the queue length to `observer` after every add, get and requeue
    ///
    /// This covers keys that arrive through delayed adds as well.
    #[must_use]
    pub fn with_depth_observer(mut self, observer: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.depth_observer = Some(Box::new(observer));
        self
    }

    fn report_depth(&self, depth: usize) {
        if let Some(observer) = &self.depth_observer {
            observer(depth);
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<K>> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock still guards valid data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `key` unless it is already pending
    ///
    /// Ignored once the queue is shutting down.
    pub fn add(&self, key: K) {
        let depth = {
            let mut state = self.state();
            if state.shutting_down || !state.dirty.insert(key.clone()) {
                return;
            }
            if state.processing.contains(&key) {
                // Requeued by `done`
                return;
            }
            state.queue.push_back(key);
            state.queue.len()
        };
        self.report_depth(depth);
        self.available.notify_one();
    }

    /// Wait for the next key and mark it in flight
    ///
    /// Returns `None` once the queue has been shut down and drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a concurrent add or
            // shutdown cannot slip between the check and the wait.
            notified.as_mut().enable();

            let popped = {
                let mut state = self.state();
                match state.queue.pop_front() {
                    Some(key) => {
                        state.dirty.remove(&key);
                        state.processing.insert(key.clone());
                        Some((key, state.queue.len()))
                    }
                    None if state.shutting_down => return None,
                    None => None,
                }
            };
            if let Some((key, depth)) = popped {
                self.report_depth(depth);
                return Some(key);
            }

            notified.await;
        }
    }

    /// Release a key handed out by `get`
    ///
    /// A key added while it was in flight is queued again.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.state();
            state.processing.remove(key);
            if state.dirty.contains(key) {
                state.queue.push_back(key.clone());
                Some(state.queue.len())
            } else {
                None
            }
        };
        if let Some(depth) = requeued {
            self.report_depth(depth);
            self.available.notify_one();
        }
    }

    /// Enqueue `key` once `delay` has elapsed
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = Arc::clone(self);
        let cancelled = self.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => queue.add(key),
                () = cancelled.cancelled() => {}
            }
        });
    }

    /// Re-enqueue `key` after its exponential backoff delay
    ///
    /// Increments the key's failure count and returns the delay used.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) -> Duration {
        let delay = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = self.backoff.delay_for(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        self.add_after(key, delay);
        delay
    }

    /// Reset the failure count of `key`
    pub fn forget(&self, key: &K) {
        self.state().failures.remove(key);
    }

    /// Number of rate-limited requeues since the key was last forgotten
    #[must_use]
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    /// Number of keys waiting for a worker
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Stop accepting keys and wake every waiting worker
    ///
    /// Queued keys are still handed out; `get` returns `None` after that.
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.timers.cancel();
        self.available.notify_waiters();
    }
}
