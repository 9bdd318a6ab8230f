//! Bounded retry of a single item after block signals.
//!
//! A soft block pauses and retries the same item; a hard block, or more
//! consecutive soft blocks than allowed, aborts the run. Any other failure is
//! final for the item but never for the run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::Blocked;
use crate::config::LimitsConfig;

/// Why processing one item stopped early
#[derive(Debug, Error)]
pub enum ItemFailure {
    #[error("blocked: {0}")]
    Blocked(#[from] Blocked),

    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

/// Retry policy for blocked items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        let initial_delay_ms = seconds(limits.recovery_pause_secs).as_millis() as u64;
        let multiplier = if limits.recovery_multiplier.is_finite() && limits.recovery_multiplier >= 1.0 {
            limits.recovery_multiplier
        } else {
            1.0
        };
        let attempts = limits.max_consecutive_blocks.max(1);

        Self {
            max_attempts: attempts,
            initial_delay_ms,
            max_delay_ms: (initial_delay_ms as f64 * multiplier.powi(attempts as i32)) as u64,
            backoff_multiplier: multiplier,
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Pause, then process the same item again
    RetryAfter(Duration),
    /// Stop the whole run
    Abort(String),
    /// Count the item as failed and move on
    GiveUp,
}

/// Attempt counter for one item
#[derive(Debug)]
pub struct BlockRetry<'a> {
    policy: &'a RetryPolicy,
    attempt: u32,
}

impl<'a> BlockRetry<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy, attempt: 1 }
    }

    /// 1-indexed number of the attempt in progress
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn on_failure(&mut self, failure: &ItemFailure) -> RetryDecision {
        match failure {
            ItemFailure::Other(_) => RetryDecision::GiveUp,
            ItemFailure::Blocked(blocked) if blocked.hard => {
                RetryDecision::Abort(format!("hard block signal: {}", blocked.reason))
            }
            ItemFailure::Blocked(blocked) => {
                if !self.policy.should_retry(self.attempt) {
                    return RetryDecision::Abort(format!(
                        "{} consecutive block signals, last: {}",
                        self.attempt, blocked.reason
                    ));
                }
                let delay = self.policy.delay_for_attempt(self.attempt);
                self.attempt += 1;
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

/// Non-negative duration from a configured number of seconds
pub fn seconds(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_limits() {
        let policy = RetryPolicy::from_limits(&LimitsConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_is_capped() {
        let limits = LimitsConfig {
            recovery_pause_secs: 10.0,
            recovery_multiplier: 2.0,
            max_consecutive_blocks: 3,
            ..LimitsConfig::default()
        };
        let policy = RetryPolicy::from_limits(&limits);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(80));
    }

    #[test]
    fn test_soft_blocks_abort_after_ceiling() {
        let policy = RetryPolicy::from_limits(&LimitsConfig::without_pauses());
        let mut retry = BlockRetry::new(&policy);
        let soft = ItemFailure::Blocked(Blocked::soft("HTTP 503"));

        assert_eq!(retry.on_failure(&soft), RetryDecision::RetryAfter(Duration::ZERO));
        assert_eq!(retry.on_failure(&soft), RetryDecision::RetryAfter(Duration::ZERO));
        assert_eq!(retry.attempt(), 3);
        assert!(matches!(retry.on_failure(&soft), RetryDecision::Abort(_)));
    }

    #[test]
    fn test_hard_block_aborts_immediately() {
        let policy = RetryPolicy::default();
        let mut retry = BlockRetry::new(&policy);
        let decision = retry.on_failure(&ItemFailure::Blocked(Blocked::hard("HTTP 429")));
        assert_eq!(decision, RetryDecision::Abort("hard block signal: HTTP 429".to_string()));
    }

    #[test]
    fn test_other_failure_gives_up() {
        let policy = RetryPolicy::default();
        let mut retry = BlockRetry::new(&policy);
        let failure = ItemFailure::Other(anyhow::anyhow!("media server returned 500"));
        assert_eq!(retry.on_failure(&failure), RetryDecision::GiveUp);
    }

    #[test]
    fn test_seconds_clamps() {
        assert_eq!(seconds(-1.0), Duration::ZERO);
        assert_eq!(seconds(f64::NAN), Duration::ZERO);
        assert_eq!(seconds(1.5), Duration::from_millis(1500));
    }
}
