//! # Managed Resource Status
//!
//! Status shape shared by every managed kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse lifecycle state surfaced to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum StatusState {
    /// Finalizer recorded, provisioning not yet confirmed
    Pending,
    /// Dependent resources provisioned for the observed generation
    Ready,
    /// The last provision or cleanup attempt failed
    Failed,
}

impl StatusState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusState::Pending => "Pending",
            StatusState::Ready => "Ready",
            StatusState::Failed => "Failed",
        }
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an `ArgoCluster` or `ArgoNamespace`
///
/// Written only by the controller through server-side apply on the status
/// subresource.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedStatus {
    /// Current lifecycle state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StatusState>,
    /// Human-readable description of the state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// True once dependent resources exist for the observed generation
    #[serde(default)]
    pub ready: bool,
    /// Time of the last status write (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Generation the state refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ManagedStatus {
    /// Pending status written right after the finalizer is recorded
    #[must_use]
    pub fn pending(generation: Option<i64>) -> Self {
        Self::new(
            StatusState::Pending,
            "Initializing or waiting for finalizer to be confirmed.".to_string(),
            generation,
        )
    }

    /// Ready status written after a successful provision
    #[must_use]
    pub fn ready(generation: Option<i64>) -> Self {
        Self::new(
            StatusState::Ready,
            "Resource provisioned successfully.".to_string(),
            generation,
        )
    }

    /// Failed status carrying the failure message
    #[must_use]
    pub fn failed(generation: Option<i64>, cause: &str) -> Self {
        Self::new(
            StatusState::Failed,
            format!("Reconciliation failed: {cause}"),
            generation,
        )
    }

    fn new(state: StatusState, message: String, generation: Option<i64>) -> Self {
        Self {
            ready: state == StatusState::Ready,
            state: Some(state),
            message: Some(message),
            last_updated: Some(chrono::Utc::now().to_rfc3339()),
            observed_generation: generation,
        }
    }

    /// True when both statuses describe the same observation
    ///
    /// `last_updated` is ignored so that rewriting an unchanged state is
    /// recognised as a no-op.
    #[must_use]
    pub fn same_observation(&self, other: &ManagedStatus) -> bool {
        self.state == other.state
            && self.message == other.message
            && self.ready == other.ready
            && self.observed_generation == other.observed_generation
    }

    /// True when provisioning already succeeded for `generation`
    #[must_use]
    pub fn is_ready_for(&self, generation: Option<i64>) -> bool {
        self.ready && self.state == Some(StatusState::Ready) && self.observed_generation == generation
    }
}
