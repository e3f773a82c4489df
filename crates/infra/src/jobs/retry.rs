//! Retry policy with bounded attempts and backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay every attempt.
    Fixed,
    /// Delay doubles per attempt, capped at `max_delay`.
    Exponential,
}

/// Bounded retry policy shared by the poller and the job runner.
///
/// Attempts are 1-based: `should_retry(n)` asks whether attempt `n + 1` may
/// run after failure `n`. Once attempts are exhausted the caller moves the
/// work out of rotation (quarantine for outbox rows, dead-letter for jobs)
/// rather than retrying forever.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(8, Duration::from_secs(5), Duration::from_secs(600))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// May another attempt run after `attempt` failures?
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following failure number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let exp = attempt.saturating_sub(1).min(31);
                self.base_delay.saturating_mul(1u32 << exp)
            }
        };
        delay.min(self.max_delay)
    }

    /// Wall-clock time of the next attempt after failure number `attempt`.
    pub fn next_attempt_at(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
        let delay = self.delay_for_attempt(attempt);
        // Delay is capped at max_delay, well within chrono's range.
        now + chrono::TimeDelta::from_std(delay).unwrap_or_else(|_| chrono::TimeDelta::zero())
    }
}
