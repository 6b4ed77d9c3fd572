//! Caller-side retry policy for optimistic-concurrency conflicts.
//!
//! The aggregate store never retries; command handlers reload the aggregate
//! and re-run the command when a save loses the race.

use std::time::Duration;

use backon::ExponentialBuilder;

/// How many times a command is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: usize,
    /// Delay before the second attempt; doubles with each further retry.
    pub min_delay: Duration,
}

impl RetryPolicy {
    /// A policy that attempts once and never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            min_delay: Duration::ZERO,
        }
    }

    /// Exponential backoff allowing `max_attempts - 1` retries.
    #[must_use]
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(25),
        }
    }
}
