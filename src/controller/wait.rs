//! # Bounded Wait
//!
//! Polls a condition with backoff until it yields a value, giving up after
//! a fixed number of attempts or a wall-clock limit, whichever comes first.

use crate::constants::{
    TOKEN_WAIT_ATTEMPTS, TOKEN_WAIT_INITIAL_DELAY_MS, TOKEN_WAIT_MAX_DELAY_MS,
    TOKEN_WAIT_TIMEOUT_SECS,
};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Limits applied by [`wait_for`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub max_attempts: u32,
    /// Delay after the first unsuccessful probe, doubled each time
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Wall-clock limit across all probes and delays
    pub timeout: Duration,
}

impl WaitPolicy {
    /// Policy for a service account token to be populated
    #[must_use]
    pub fn service_account_token() -> Self {
        Self {
            max_attempts: TOKEN_WAIT_ATTEMPTS,
            initial_delay: Duration::from_millis(TOKEN_WAIT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(TOKEN_WAIT_MAX_DELAY_MS),
            timeout: Duration::from_secs(TOKEN_WAIT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError<E> {
    /// The condition was not met within the policy limits
    #[error("condition not met after {attempts} attempts in {elapsed:?}")]
    Timeout { attempts: u32, elapsed: Duration },
    /// A probe failed outright
    #[error(transparent)]
    Failed(E),
}

/// Poll `probe` until it returns `Ok(Some(_))`
///
/// `Ok(None)` means "not yet" and triggers another attempt after a delay.
/// An `Err` from the probe aborts the wait immediately.
pub async fn wait_for<T, E, F, Fut>(policy: WaitPolicy, mut probe: F) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut delay = policy.initial_delay;
    let mut attempts = 0;

    while attempts < policy.max_attempts {
        attempts += 1;
        match tokio::time::timeout_at(deadline, probe()).await {
            Ok(Ok(Some(value))) => return Ok(value),
            Ok(Ok(None)) => {}
            Ok(Err(err)) => return Err(WaitError::Failed(err)),
            Err(_elapsed) => break,
        }

        if attempts == policy.max_attempts {
            break;
        }
        let now = Instant::now();
        if now + delay >= deadline {
            tokio::time::sleep_until(deadline).await;
            break;
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(policy.max_delay);
    }

    Err(WaitError::Timeout {
        attempts,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32, timeout_secs: u64) -> WaitPolicy {
        WaitPolicy {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_ready_value() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, WaitError<()>> = wait_for(policy(10, 60), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n >= 2 { Some("token") } else { None }) }
        })
        .await;
        assert_eq!(result.unwrap(), "token");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_ceiling_yields_timeout() {
        let calls = AtomicU32::new(0);
        let result: Result<(), WaitError<()>> = wait_for(policy(3, 60), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        })
        .await;
        match result {
            Err(WaitError::Timeout { attempts, elapsed }) => {
                assert_eq!(attempts, 3);
                // 1s + 2s between three probes
                assert_eq!(elapsed, Duration::from_secs(3));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_cap_yields_timeout() {
        let result: Result<(), WaitError<()>> = wait_for(policy(100, 10), || async { Ok(None) }).await;
        match result {
            Err(WaitError::Timeout { elapsed, .. }) => {
                assert_eq!(elapsed, Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_aborts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), WaitError<&str>> = wait_for(policy(10, 60), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("forbidden") }
        })
        .await;
        assert!(matches!(result, Err(WaitError::Failed("forbidden"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
