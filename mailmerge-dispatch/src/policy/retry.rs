//! Retry policy for a single send.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded, fixed-delay retry of one send.
///
/// A message whose every attempt fails is tried `retries + 1` times in
/// total before it is counted as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    ///
    /// Default: 2
    #[serde(default = "defaults::retries")]
    pub retries: u32,

    /// Pause before each retry (in milliseconds).
    ///
    /// Default: 500 milliseconds
    #[serde(default = "defaults::delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: defaults::retries(),
            delay_ms: defaults::delay_ms(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "A delay of more than u64::MAX milliseconds is not meaningful"
    )]
    pub const fn new(retries: u32, delay: Duration) -> Self {
        Self {
            retries,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Whether another attempt should follow `retries_made` failed retries.
    #[must_use]
    pub const fn should_retry(&self, retries_made: u32) -> bool {
        retries_made < self.retries
    }

    /// Most attempts one message can consume
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

mod defaults {
    pub const fn retries() -> u32 {
        2
    }

    pub const fn delay_ms() -> u64 {
        500
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 2);
        assert_eq!(policy.delay(), Duration::from_millis(500));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1));

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_no_retries() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert!(!policy.should_retry(0));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let policy: RetryPolicy = ron::from_str("(retries: 5)").unwrap();
        assert_eq!(policy.retries, 5);
        assert_eq!(policy.delay_ms, 500);
    }
}
