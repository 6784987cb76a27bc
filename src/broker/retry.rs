//! Pure reconnection scheduling
//!
//! Bounded exponential backoff for the reconnect sequence. Delays are computed
//! with an integer shift on the attempt index and the exponent is capped, so
//! large attempt budgets never overflow.

use super::connection::BrokerConfig;
use std::time::Duration;

/// Backoff stops doubling after this many doublings by default
pub const DEFAULT_MAX_BACKOFF_EXPONENT: u32 = 16;

/// Hard ceiling for the exponent so the shift stays inside `u32`
pub const MAX_BACKOFF_EXPONENT_CEILING: u32 = 31;

/// Attempt budget and backoff base for one reconnect sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_interval: Duration,
    pub max_exponent: u32,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then make the next attempt
    Retry { next_attempt: u32, delay: Duration },
    /// Budget spent
    Exhausted,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_interval: Duration) -> Self {
        Self {
            max_attempts,
            base_interval,
            max_exponent: DEFAULT_MAX_BACKOFF_EXPONENT,
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            max_attempts: config.connection_retry_attempts,
            base_interval: config.connection_retry_interval(),
            max_exponent: config.max_backoff_exponent,
        }
    }

    /// Delay after the failed attempt with zero-based index `attempt`:
    /// `base_interval * 2^min(attempt, max_exponent)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt
            .min(self.max_exponent)
            .min(MAX_BACKOFF_EXPONENT_CEILING);
        self.base_interval.saturating_mul(1u32 << exponent)
    }

    /// Decide what follows the failed attempt with zero-based index `attempt`
    pub fn after_failure(&self, attempt: u32) -> RetryDecision {
        let next_attempt = attempt.saturating_add(1);
        if next_attempt >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry {
                next_attempt,
                delay: self.backoff_delay(attempt),
            }
        }
    }

    /// Reject budgets the reconnect sequence cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("connection_retry_attempts must be greater than 0".to_string());
        }
        if self.base_interval.is_zero() {
            return Err("connection_retry_interval_ms must be greater than 0".to_string());
        }
        if self.max_exponent > MAX_BACKOFF_EXPONENT_CEILING {
            return Err(format!(
                "max_backoff_exponent must not exceed {MAX_BACKOFF_EXPONENT_CEILING}"
            ));
        }
        Ok(())
    }
}
