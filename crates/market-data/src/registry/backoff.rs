//! Bounded exponential backoff with optional full jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::{ErrorHandling, RetryPolicy};
use crate::errors::ErrorKind;

/// Retry decisions for one provider within a request.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    policy: RetryPolicy,
    handling: ErrorHandling,
}

impl BackoffPolicy {
    pub fn new(policy: RetryPolicy, handling: ErrorHandling) -> Self {
        Self { policy, handling }
    }

    /// Deterministic delay before retry `attempt` (1-indexed), ignoring jitter.
    ///
    /// `min(max_delay, base_delay * 2^(attempt - 1))`, saturating on overflow.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.policy
            .base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.policy.max_delay, |d| d.min(self.policy.max_delay))
    }

    /// Delay to sleep before retry `attempt`.
    ///
    /// With jitter enabled the result is drawn uniformly from
    /// `[0, capped_delay(attempt)]` on every call.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.capped_delay(attempt);
        if !self.policy.random_jitter || delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }

    /// Whether a failure of `kind` on call `attempt` should be retried on the
    /// same provider.
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        if attempt > self.policy.max_retries {
            return false;
        }
        match kind {
            ErrorKind::ConnectionError => self.handling.retry_on_connection_error,
            ErrorKind::Timeout => self.handling.retry_on_timeout,
            ErrorKind::RateLimited => self.handling.retry_on_rate_limit,
            _ => false,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.policy.max_retries
    }
}
