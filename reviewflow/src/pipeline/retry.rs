//! Per-stage retry policies with backoff and jitter.
//!
//! A policy lists the error classes it retries. Any other class fails the
//! stage on its first occurrence.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use super::definition::StageId;
use crate::client::next_interval;
use crate::errors::{ErrorClass, InvocationError};
use crate::events::{EventSink, PipelineEvent};

/// Jitter strategy applied to each retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
}

impl JitterStrategy {
    /// Applies the jitter to `delay`.
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let jittered = match self {
            Self::None => millis,
            Self::Full => {
                if millis == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=millis)
                }
            }
        };
        Duration::from_millis(jittered)
    }
}

/// Retry behaviour of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Error classes that are retried.
    pub retry_on: Vec<ErrorClass>,
    /// Invocations allowed in total, first one included.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub interval: Duration,
    /// Growth rate of the wait.
    pub rate: f64,
    /// Ceiling of the wait.
    pub max_interval: Option<Duration>,
    /// Jitter applied to every wait.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Policy of the review compute stages: 2 s, 6 attempts, rate 2.
    #[must_use]
    pub fn content_stage() -> Self {
        Self {
            retry_on: ErrorClass::TRANSIENT.to_vec(),
            max_attempts: 6,
            interval: Duration::from_secs(2),
            rate: 2.0,
            max_interval: None,
            jitter: JitterStrategy::None,
        }
    }

    /// Policy of the notification stage: 1 s, 3 attempts, rate 2, full jitter.
    #[must_use]
    pub fn notification() -> Self {
        Self {
            retry_on: ErrorClass::TRANSIENT.to_vec(),
            max_attempts: 3,
            interval: Duration::from_secs(1),
            rate: 2.0,
            max_interval: None,
            jitter: JitterStrategy::Full,
        }
    }

    /// A single attempt, nothing retried.
    #[must_use]
    pub fn none() -> Self {
        Self {
            retry_on: Vec::new(),
            max_attempts: 1,
            interval: Duration::ZERO,
            rate: 1.0,
            max_interval: None,
            jitter: JitterStrategy::None,
        }
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the ceiling.
    #[must_use]
    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    /// Whether `class` is retried by this policy.
    #[must_use]
    pub fn retries(&self, class: ErrorClass) -> bool {
        self.retry_on.contains(&class)
    }

    fn advance(&self, current: Duration) -> Duration {
        next_interval(current, self.rate, self.max_interval.unwrap_or(Duration::MAX))
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    /// Final result.
    pub result: Result<T, InvocationError>,
    /// Invocations made.
    pub attempts: u32,
}

/// Runs `operation` under `policy`, reporting attempts to `events`.
///
/// `operation` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    stage: StageId,
    events: &dyn EventSink,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, InvocationError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut interval = policy.interval;
    let mut attempt = 0;

    loop {
        attempt += 1;
        events.emit(&PipelineEvent::StageStarted { stage, attempt });

        let error = match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) => e,
        };

        if !policy.retries(error.class) {
            tracing::warn!(stage = %stage, attempt, error = %error, "Stage error is not retryable");
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
            };
        }
        if attempt >= max_attempts {
            tracing::warn!(stage = %stage, attempt, error = %error, "Stage retries exhausted");
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
            };
        }

        let delay = policy.jitter.apply(interval);
        tracing::debug!(
            stage = %stage,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after error"
        );
        events.emit(&PipelineEvent::StageRetryScheduled {
            stage,
            attempt,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error_class: error.class,
        });
        tokio::time::sleep(delay).await;
        interval = policy.advance(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingEventSink, NoOpEventSink};
    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[test]
    fn test_jitter_none_is_identity() {
        let delay = Duration::from_millis(1500);
        assert_eq!(JitterStrategy::None.apply(delay), delay);
    }

    #[test]
    fn test_full_jitter_within_bounds() {
        let delay = Duration::from_millis(100);
        for _ in 0..100 {
            assert!(JitterStrategy::Full.apply(delay) <= delay);
        }
        assert_eq!(JitterStrategy::Full.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_stage_policies() {
        let content = RetryPolicy::content_stage();
        assert_eq!(content.max_attempts, 6);
        assert_eq!(content.interval, Duration::from_secs(2));
        assert!(content.retries(ErrorClass::Throttled));
        assert!(!content.retries(ErrorClass::TaskFailed));

        let notify = RetryPolicy::notification();
        assert_eq!(notify.max_attempts, 3);
        assert_eq!(notify.jitter, JitterStrategy::Full);

        assert!(!RetryPolicy::none().retries(ErrorClass::ServiceException));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_error_succeeds_on_fourth_attempt() {
        let calls = Mutex::new(0u32);
        let start = Instant::now();

        let outcome = with_retry(
            &RetryPolicy::content_stage(),
            StageId::FetchChanges,
            &NoOpEventSink,
            |attempt| {
                *calls.lock() += 1;
                async move {
                    if attempt < 4 {
                        Err(InvocationError::service("Lambda.ServiceException"))
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;

        assert_eq!(outcome.result, Ok("done"));
        assert_eq!(outcome.attempts, 4);
        assert_eq!(*calls.lock(), 4);
        // 2s, 4s, 8s
        assert_eq!(start.elapsed(), Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_after_one_attempt() {
        let events = CollectingEventSink::new();
        let outcome: RetryOutcome<()> = with_retry(
            &RetryPolicy::content_stage(),
            StageId::PostComments,
            &events,
            |_| async { Err(InvocationError::task_failed("HTTP 400")) },
        )
        .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.unwrap_err().class, ErrorClass::TaskFailed);
        assert_eq!(events.event_types(), vec!["stage.started"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_max_attempts() {
        let events = CollectingEventSink::new();
        let policy = RetryPolicy::content_stage().with_max_interval(Duration::from_secs(5));
        let start = Instant::now();

        let outcome: RetryOutcome<()> = with_retry(&policy, StageId::GenerateReview, &events, |_| async {
            Err(InvocationError::timeout("Sandbox.Timedout"))
        })
        .await;

        assert_eq!(outcome.attempts, 6);
        assert_eq!(events.events_of_type("stage.retry_scheduled").len(), 5);
        // 2 + 4 + 5 + 5 + 5 with the ceiling applied
        assert_eq!(start.elapsed(), Duration::from_secs(21));
    }
}
