//! # Controller
//!
//! Core controller modules for the Argo Attach Controller.
//!
//! - `backoff`: Exponential per-key backoff
//! - `capability`: Provision and cleanup seam plus per-kind descriptors
//! - `key`: Managed kinds and queue keys
//! - `queue`: Deduplicating work queue with delayed and rate-limited adds
//! - `reconciler`: Finalizer-guarded reconciliation state machine
//! - `store`: Object access seam over the Kubernetes API
//! - `updater`: Finalizer and status writes with conflict retries
//! - `wait`: Bounded polling for asynchronously created objects

pub mod backoff;
pub mod capability;
pub mod key;
pub mod queue;
pub mod reconciler;
pub mod store;
pub mod updater;
pub mod wait;
