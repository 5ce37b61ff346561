//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the managed custom resources
pub const API_GROUP: &str = "field.vmware.com";

/// Finalizer guarding cleanup of `ArgoCluster` resources
pub const ARGO_CLUSTER_FINALIZER: &str = "field.vmware.com/argo-attach-cluster-cleanup";

/// Finalizer guarding cleanup of `ArgoNamespace` resources
pub const ARGO_NAMESPACE_FINALIZER: &str = "field.vmware.com/argo-attach-ns-cleanup";

/// Field manager used for server-side apply of the status subresource
pub const STATUS_FIELD_MANAGER: &str = "status-controller";

/// Field manager used for server-side apply of dependent objects
pub const CONTROLLER_FIELD_MANAGER: &str = "argo-attach-controller";

/// Label Argo CD uses to discover cluster secrets
pub const ARGO_SECRET_TYPE_LABEL: &str = "argocd.argoproj.io/secret-type";

/// Service account created when an `ArgoNamespace` does not name one
pub const DEFAULT_SERVICE_ACCOUNT: &str = "argo-attach-sa";

/// ClusterRole bound to the generated service account
pub const SERVICE_ACCOUNT_CLUSTER_ROLE: &str = "edit";

/// In-cluster API server address used for namespace-scoped Argo clusters
pub const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc.cluster.local:443";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default full resync period (seconds)
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 60;

/// Default number of concurrent workers draining the queue
pub const DEFAULT_WORKERS: usize = 2;

/// Default per-key backoff base delay (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

/// Default per-key backoff ceiling (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;

/// Consecutive failures after which a key is forgotten until the next change or resync
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Attempts made by a status write before giving up on conflicts
pub const DEFAULT_STATUS_RETRY_ATTEMPTS: u32 = 5;

/// Fixed delay between conflicting status writes (milliseconds)
pub const DEFAULT_STATUS_RETRY_DELAY_MS: u64 = 100;

/// Attempts made while waiting for a service account token to materialize
pub const TOKEN_WAIT_ATTEMPTS: u32 = 10;

/// Initial delay between token polls (milliseconds)
pub const TOKEN_WAIT_INITIAL_DELAY_MS: u64 = 1000;

/// Upper bound on a single token poll delay (milliseconds)
pub const TOKEN_WAIT_MAX_DELAY_MS: u64 = 4000;

/// Wall-clock cap on waiting for a service account token (seconds)
pub const TOKEN_WAIT_TIMEOUT_SECS: u64 = 15;
