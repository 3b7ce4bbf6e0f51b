//! Backoff scheduling and retry budgets.
//!
//! [`next_interval`] is the pure growth rule. [`RetryBudget`] is the state a
//! caller owns for one operation: it is created per operation, mutated in
//! place across iterations and never shared between operations.

use std::time::Duration;

/// Computes the interval following `current`: `min(current * rate, ceiling)`.
///
/// Products that cannot be represented (overflow, NaN or negative rates)
/// saturate to the ceiling.
#[must_use]
pub fn next_interval(current: Duration, rate: f64, ceiling: Duration) -> Duration {
    Duration::try_from_secs_f64(current.as_secs_f64() * rate)
        .unwrap_or(ceiling)
        .min(ceiling)
}

/// Attempt counter and interval state for one retrying operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryBudget {
    /// Attempts consumed so far.
    pub attempt: u32,
    /// Attempts allowed in total.
    pub max_attempts: u32,
    /// Wait to apply before the next attempt.
    pub current_interval: Duration,
    /// Ceiling for `current_interval`.
    pub max_interval: Duration,
    rate: f64,
    initial_interval: Duration,
}

impl RetryBudget {
    /// A budget whose interval never grows.
    #[must_use]
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self::backoff(max_attempts, interval, 1.0, interval)
    }

    /// A budget whose interval grows by `rate` up to `max_interval`.
    #[must_use]
    pub fn backoff(max_attempts: u32, initial: Duration, rate: f64, max_interval: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            current_interval: initial.min(max_interval),
            max_interval,
            rate,
            initial_interval: initial.min(max_interval),
        }
    }

    /// Consumes one attempt and returns its 1-based number.
    pub fn consume(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Returns true once every attempt has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Attempts still available.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }

    /// Returns the wait to apply now and advances the interval.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_interval;
        self.current_interval = next_interval(delay, self.rate, self.max_interval);
        delay
    }

    /// Restores the initial state.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_interval = self.initial_interval;
    }
}
