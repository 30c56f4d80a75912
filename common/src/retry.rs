// Retry backoff policy: delay before the next attempt of a failed task

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default delay before the first retry
pub const DEFAULT_BASE_RETRY_DELAY: Duration = Duration::from_millis(1_000);

/// Default upper bound on any single retry delay (one hour)
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_millis(3_600_000);

/// How the retry delay grows with the attempt number
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `base * 2^(attempt - 1)`, capped at the max delay
    #[default]
    Exponential,
    /// `base * attempt`, capped at the max delay
    Linear,
    /// Always `base`
    Fixed,
}

impl std::fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffStrategy::Exponential => write!(f, "exponential"),
            BackoffStrategy::Linear => write!(f, "linear"),
            BackoffStrategy::Fixed => write!(f, "fixed"),
        }
    }
}

/// Delay before the next attempt.
///
/// `attempt` is the retry count after the failing attempt has been counted, so
/// the first retry uses `attempt = 1`. Zero is treated as one. Arithmetic
/// saturates rather than overflowing.
pub fn next_delay(
    attempt: u32,
    strategy: BackoffStrategy,
    base_delay: Duration,
    max_delay: Duration,
) -> Duration {
    let attempt = attempt.max(1);

    match strategy {
        BackoffStrategy::Exponential => {
            let factor = 2_u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
            base_delay.saturating_mul(factor).min(max_delay)
        }
        BackoffStrategy::Linear => base_delay.saturating_mul(attempt).min(max_delay),
        BackoffStrategy::Fixed => base_delay,
    }
}

/// Retry configuration bundled for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub strategy: BackoffStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay: DEFAULT_BASE_RETRY_DELAY,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(strategy: BackoffStrategy, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            strategy,
            base_delay,
            max_delay,
        }
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        next_delay(attempt, self.strategy, self.base_delay, self.max_delay)
    }

    /// Absolute time of the next attempt, measured from `now`
    pub fn next_attempt_at(&self, attempt: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.next_delay(attempt))
            .unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
