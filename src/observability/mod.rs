//! # Observability
//!
//! Prometheus metrics exposed by the probe server.

pub mod metrics;
