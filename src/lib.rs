//! Argo Attach Controller Library
//!
//! This library provides the core functionality for the Argo Attach Controller.
//! Unit tests live next to the code; integration tests under `tests/` drive the
//! reconciler and worker pool against an in-memory object store.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod provider;
pub mod runtime;
pub mod server;
