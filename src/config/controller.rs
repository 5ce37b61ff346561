//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables, with command
//! line flags layered on top by the binary.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Full resync period (seconds)
    /// Every known object is re-enqueued at this interval to recover from missed events
    pub resync_period_secs: u64,
    /// Namespaces that may not be used as the Argo CD namespace of an `ArgoCluster`
    pub blocked_namespaces: Vec<String>,
    /// Number of workers draining the shared queue
    pub workers: usize,
    /// Per-key backoff base delay (milliseconds), doubled per consecutive failure
    pub backoff_base_ms: u64,
    /// Per-key backoff ceiling (milliseconds)
    pub backoff_max_ms: u64,
    /// Consecutive failures before a key is forgotten
    pub max_retries: u32,
    /// Attempts made by a status write on conflict
    pub status_retry_attempts: u32,
    /// Fixed delay between conflicting status writes (milliseconds)
    pub status_retry_delay_ms: u64,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            blocked_namespaces: Vec::new(),
            workers: DEFAULT_WORKERS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            status_retry_attempts: DEFAULT_STATUS_RETRY_ATTEMPTS,
            status_retry_delay_ms: DEFAULT_STATUS_RETRY_DELAY_MS,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            resync_period_secs: parse_or(&lookup, "RESYNC_PERIOD_SECS", defaults.resync_period_secs),
            blocked_namespaces: lookup("BLOCKED_NAMESPACES")
                .map(|v| parse_namespace_list(&v))
                .unwrap_or(defaults.blocked_namespaces),
            workers: parse_or(&lookup, "WORKERS", defaults.workers),
            backoff_base_ms: parse_or(&lookup, "BACKOFF_BASE_MS", defaults.backoff_base_ms),
            backoff_max_ms: parse_or(&lookup, "BACKOFF_MAX_MS", defaults.backoff_max_ms),
            max_retries: parse_or(&lookup, "MAX_RETRIES", defaults.max_retries),
            status_retry_attempts: parse_or(
                &lookup,
                "STATUS_RETRY_ATTEMPTS",
                defaults.status_retry_attempts,
            ),
            status_retry_delay_ms: parse_or(
                &lookup,
                "STATUS_RETRY_DELAY_MS",
                defaults.status_retry_delay_ms,
            ),
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port),
        }
    }

    /// Get resync period duration
    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    /// Get backoff base duration
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Get status retry delay duration
    pub fn status_retry_delay(&self) -> Duration {
        Duration::from_millis(self.status_retry_delay_ms)
    }
}

/// Parse a value from the lookup or fall back to the default
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Split a comma separated namespace list, dropping blanks
fn parse_namespace_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
