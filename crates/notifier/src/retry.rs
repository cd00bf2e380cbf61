//! Bounded retry-with-backoff for a single subscriber delivery.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::DeliveryError;

/// Retry budget and pacing for one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Clamped to at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt. Doubles after each failure.
    pub base_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Checked shift so attempts >= 32 saturate instead of overflowing.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Final result of a retried delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted {
    pub result: Result<(), DeliveryError>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails permanently, or the budget is
/// spent. Each attempt is cut off after `policy.attempt_timeout`, which
/// counts as a transient failure.
///
/// The closure receives the attempt number (0-indexed).
pub async fn retry_with_backoff<F, Fut>(policy: &RetryPolicy, operation: F) -> Attempted
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<(), DeliveryError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.attempt_timeout, operation(attempt)).await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(policy.attempt_timeout)),
        };
        attempt += 1;

        let err = match result {
            Ok(()) => {
                return Attempted {
                    result: Ok(()),
                    attempts: attempt,
                };
            }
            Err(err) => err,
        };
        if !err.is_transient() || attempt >= max_attempts {
            return Attempted {
                result: Err(err),
                attempts: attempt,
            };
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        warn!(
            attempt,
            max = max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "retrying after transient delivery error"
        );
        tokio::time::sleep(delay).await;
    }
}
