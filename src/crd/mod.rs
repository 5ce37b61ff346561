//! # Custom Resource Definitions
//!
//! CRD types for the managed kinds.
//!
//! ## Module Structure
//!
//! - `argo_cluster.rs` - `ArgoCluster` resource definition
//! - `argo_namespace.rs` - `ArgoNamespace` resource definition
//! - `status.rs` - Status shared by both kinds

mod argo_cluster;
mod argo_namespace;
mod status;

// Re-export all public types
pub use argo_cluster::{ArgoCluster, ArgoClusterSpec};
pub use argo_namespace::{ArgoNamespace, ArgoNamespaceSpec};
pub use status::{ManagedStatus, StatusState};
