//! # CRD Generator
//!
//! Generates the CustomResourceDefinitions of `ArgoCluster` and
//! `ArgoNamespace` from their Rust type definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/argo-attach.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use argo_attach_controller::crd::{ArgoCluster, ArgoNamespace};
use kube::core::CustomResourceExt;

fn main() {
    for crd in [ArgoCluster::crd(), ArgoNamespace::crd()] {
        match serde_yaml::to_string(&crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}
