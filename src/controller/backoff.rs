//! # Exponential Backoff
//!
//! Per-key retry delays for the work queue.
//!
//! The delay for a key that has failed `n` times is `base * 2^n`, capped at
//! `max`. Failure counts are owned by the queue; this type only maps a count
//! to a delay.
//!
//! ## Usage
//!
//! ```rust
//! use argo_attach_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
//! assert_eq!(backoff.delay_for(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
//! assert_eq!(backoff.delay_for(3), Duration::from_secs(8));
//! assert_eq!(backoff.delay_for(10), Duration::from_secs(60));
//! ```

use std::time::Duration;

/// Exponential backoff calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff with the given base delay and ceiling
    ///
    /// # Arguments
    ///
    /// * `base` - Delay after the first failure
    /// * `max` - Upper bound on any delay
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay for a key that has already failed `failures` times
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        // 2^31 * base already exceeds any sane ceiling
        let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        use crate::constants::{DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS};
        Self::new(
            Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let backoff = ExponentialBackoff::default();

        // 1s, 2s, 4s, 8s, 16s, 32s, 60s (max)
        assert_eq!(backoff.delay_for(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(8));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(16));
        assert_eq!(backoff.delay_for(5), Duration::from_secs(32));
        assert_eq!(backoff.delay_for(6), Duration::from_secs(60));
    }

    #[test]
    fn test_exponential_backoff_max_cap() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(5), Duration::from_millis(3200));
        assert_eq!(backoff.delay_for(6), Duration::from_secs(5));
        // Should stay at max without overflowing
        assert_eq!(backoff.delay_for(40), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_backoff_is_stateless() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.delay_for(2), backoff.delay_for(2));
        assert_eq!(backoff.base(), Duration::from_secs(1));
        assert_eq!(backoff.max(), Duration::from_secs(60));
    }
}
