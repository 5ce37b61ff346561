//! # Runtime
//!
//! Process-level wiring of the controller.
//!
//! - `change_source`: watch events and periodic resync feeding the queue
//! - `error_policy`: outcome classification into queue operations
//! - `initialization`: assembly of stores, capabilities and reconcilers
//! - `worker_pool`: workers draining the queue

pub mod change_source;
pub mod error_policy;
pub mod initialization;
pub mod worker_pool;

pub use change_source::{InitialSync, KubeChangeSource};
pub use error_policy::Disposition;
pub use worker_pool::{ControllerRuntime, Enqueue};
