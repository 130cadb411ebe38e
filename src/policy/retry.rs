//! Retry decision logic
//!
//! Pure function of the failed attempt: no clocks, no locks, no side
//! effects, so the policy is testable without a runtime.

use std::time::Duration;

use crate::domain::{TaskConfig, TaskFailure};

/// What to do with a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue after sleeping `delay` (the owning worker only)
    Retry { delay: Duration },
    /// Budget exhausted or failure not retryable; finalize as Failed
    Finalize,
}

/// Exponential-backoff retry policy shared by every worker
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Ceiling on any single backoff delay, bounding pathological growth
    backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(backoff_cap: Duration) -> Self {
        Self { backoff_cap }
    }

    /// Decide whether a failed attempt is re-queued.
    ///
    /// Retry iff the failure kind is retryable and the task still has
    /// budget; `retry_count` is the number of retries already consumed.
    pub fn decide(&self, retry_count: u32, config: &TaskConfig, failure: &TaskFailure) -> RetryDecision {
        if !failure.is_retryable() || retry_count >= config.max_retries {
            return RetryDecision::Finalize;
        }
        RetryDecision::Retry {
            delay: self.backoff_delay(retry_count, config),
        }
    }

    /// `retry_delay * backoff_factor^retry_count`, capped
    pub fn backoff_delay(&self, retry_count: u32, config: &TaskConfig) -> Duration {
        let factor = config.backoff_factor.powi(retry_count as i32);
        if !factor.is_finite() {
            return self.backoff_cap;
        }
        let delay = config.retry_delay.mul_f64(factor);
        delay.min(self.backoff_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn exec_failure() -> TaskFailure {
        TaskFailure::Execution("boom".into())
    }

    #[test]
    fn test_retry_within_budget() {
        let policy = RetryPolicy::default();
        let config = TaskConfig::new()
            .with_max_retries(3)
            .with_retry_delay(Duration::from_millis(100));

        assert_eq!(
            policy.decide(0, &config, &exec_failure()),
            RetryDecision::Retry {
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            policy.decide(2, &config, &exec_failure()),
            RetryDecision::Retry {
                delay: Duration::from_millis(400)
            }
        );
    }

    #[test]
    fn test_finalize_when_budget_spent() {
        let policy = RetryPolicy::default();
        let config = TaskConfig::new().with_max_retries(3);
        assert_eq!(policy.decide(3, &config, &exec_failure()), RetryDecision::Finalize);
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let policy = RetryPolicy::default();
        let config = TaskConfig::new().with_max_retries(0);
        assert_eq!(policy.decide(0, &config, &exec_failure()), RetryDecision::Finalize);
    }

    #[test]
    fn test_timeout_is_retryable_dependency_is_not() {
        let policy = RetryPolicy::default();
        let config = TaskConfig::new().with_max_retries(3);

        let timeout = TaskFailure::Timeout {
            limit: Duration::from_secs(1),
        };
        assert!(matches!(
            policy.decide(0, &config, &timeout),
            RetryDecision::Retry { .. }
        ));

        let dep = TaskFailure::Dependency("upstream failed".into());
        assert_eq!(policy.decide(0, &config, &dep), RetryDecision::Finalize);
    }

    #[test]
    fn test_backoff_hits_cap() {
        let policy = RetryPolicy::new(Duration::from_secs(60));
        let config = TaskConfig::new()
            .with_retry_delay(Duration::from_secs(1))
            .with_backoff_factor(10.0);

        // 1s, 10s, then clamped
        assert_eq!(policy.backoff_delay(0, &config), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1, &config), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(2, &config), Duration::from_secs(60));
        assert_eq!(policy.backoff_delay(30, &config), Duration::from_secs(60));
    }

    proptest! {
        #[test]
        fn prop_backoff_bounded_and_monotonic(
            delay_ms in 0u64..10_000,
            factor in 1.0f64..8.0,
            retries in 0u32..24,
        ) {
            let policy = RetryPolicy::new(Duration::from_secs(60));
            let config = TaskConfig::new()
                .with_retry_delay(Duration::from_millis(delay_ms))
                .with_backoff_factor(factor);

            let current = policy.backoff_delay(retries, &config);
            let next = policy.backoff_delay(retries + 1, &config);

            prop_assert!(current <= Duration::from_secs(60));
            prop_assert!(next >= current);
        }
    }
}
