//! Poll loop: waits for a pipeline run to reach a terminal status.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::backoff::RetryBudget;
use super::classifier::classify;
use super::transport::ReviewApi;
use crate::config::duration_secs;
use crate::core::{CheckOutcome, ExecutionHandle, PipelineOutcome, StatusCheckResult};
use crate::errors::{Result, ReviewflowError};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};

/// Sizing hint deciding how long to wait before the first status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSize {
    /// Regular pull request.
    #[default]
    Standard,
    /// Pull request expected to take the slow path.
    Large,
}

/// Timing policy of the poll loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Status checks allowed before giving up.
    #[serde(default = "default_deadline_attempts")]
    pub deadline_attempts: u32,
    /// Wait after the first non-terminal check.
    #[serde(default = "default_initial_interval", with = "duration_secs")]
    pub initial_interval: Duration,
    /// Growth rate of the wait.
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Ceiling of the wait.
    #[serde(default = "default_max_interval", with = "duration_secs")]
    pub max_interval: Duration,
    /// Delay before the first check for [`InputSize::Standard`].
    #[serde(default = "default_standard_delay", with = "duration_secs")]
    pub standard_initial_delay: Duration,
    /// Delay before the first check for [`InputSize::Large`].
    #[serde(default = "default_large_delay", with = "duration_secs")]
    pub large_initial_delay: Duration,
    /// Wall-clock ceiling on the whole wait, initial delay included.
    #[serde(default = "default_max_elapsed", with = "duration_secs")]
    pub max_elapsed: Duration,
}

fn default_deadline_attempts() -> u32 {
    10
}

fn default_initial_interval() -> Duration {
    Duration::from_secs(20)
}

fn default_rate() -> f64 {
    2.0
}

fn default_max_interval() -> Duration {
    Duration::from_secs(50)
}

fn default_standard_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_large_delay() -> Duration {
    Duration::from_secs(20)
}

fn default_max_elapsed() -> Duration {
    Duration::from_secs(15 * 60)
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            deadline_attempts: default_deadline_attempts(),
            initial_interval: default_initial_interval(),
            rate: default_rate(),
            max_interval: default_max_interval(),
            standard_initial_delay: default_standard_delay(),
            large_initial_delay: default_large_delay(),
            max_elapsed: default_max_elapsed(),
        }
    }
}

impl PollPolicy {
    /// Sets the number of status checks allowed.
    #[must_use]
    pub fn with_deadline_attempts(mut self, attempts: u32) -> Self {
        self.deadline_attempts = attempts;
        self
    }

    /// Sets the wall-clock ceiling.
    #[must_use]
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Delay before the first check.
    #[must_use]
    pub fn initial_delay(&self, size: InputSize) -> Duration {
        match size {
            InputSize::Standard => self.standard_initial_delay,
            InputSize::Large => self.large_initial_delay,
        }
    }

    /// Checks the policy is usable.
    pub fn validate(&self) -> Result<()> {
        if self.deadline_attempts == 0 {
            return Err(ReviewflowError::configuration("poll.deadline_attempts must be at least 1"));
        }
        if !self.rate.is_finite() || self.rate < 1.0 {
            return Err(ReviewflowError::configuration(format!(
                "poll.rate must be >= 1 (got {})",
                self.rate
            )));
        }
        Ok(())
    }

    fn budget(&self) -> RetryBudget {
        RetryBudget::backoff(
            self.deadline_attempts,
            self.initial_interval,
            self.rate,
            self.max_interval,
        )
    }
}

/// Polls the status endpoint until a terminal outcome or budget exhaustion.
#[derive(Clone)]
pub struct Poller {
    api: Arc<dyn ReviewApi>,
    policy: PollPolicy,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Creates a poller with the default policy.
    pub fn new(api: Arc<dyn ReviewApi>) -> Self {
        Self::with_policy(api, PollPolicy::default())
    }

    /// Creates a poller with an explicit policy.
    pub fn with_policy(api: Arc<dyn ReviewApi>, policy: PollPolicy) -> Self {
        Self {
            api,
            policy,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Performs one status check and classifies it.
    ///
    /// `Err` only for transport failures; non-2xx responses are reported as
    /// [`CheckOutcome::Malformed`].
    pub async fn check(&self, handle: &ExecutionHandle) -> Result<StatusCheckResult> {
        let response = self.api.fetch_status(handle).await?;
        if !response.is_success() {
            return Ok(StatusCheckResult::malformed(response.body));
        }
        Ok(classify(&response.body))
    }

    /// Waits for `handle` to finish using the policy's attempt budget.
    pub async fn wait(&self, handle: &ExecutionHandle, size: InputSize) -> Result<PipelineOutcome> {
        self.wait_with_deadline(handle, size, self.policy.deadline_attempts)
            .await
    }

    /// Waits for `handle` to finish within `deadline_attempts` status checks.
    ///
    /// SUCCEEDED returns the outcome, FAILED returns
    /// [`ReviewflowError::PollFailure`] at once. Pending, unknown and malformed
    /// checks (and transport failures) consume an attempt and advance the
    /// backoff. No wait follows the last allowed check. A policy whose waits
    /// could shrink, or a zero deadline, is rejected before the first wait.
    pub async fn wait_with_deadline(
        &self,
        handle: &ExecutionHandle,
        size: InputSize,
        deadline_attempts: u32,
    ) -> Result<PipelineOutcome> {
        let policy = self.policy.clone().with_deadline_attempts(deadline_attempts);
        policy.validate()?;

        let started = Instant::now();
        let mut budget = policy.budget();

        let initial_delay = self.policy.initial_delay(size);
        debug!(execution = %handle, delay_ms = initial_delay.as_millis() as u64, ?size, "Waiting before first status check");
        tokio::time::sleep(initial_delay).await;

        let mut last_status: Option<String> = None;
        loop {
            if budget.is_exhausted() {
                break;
            }
            let attempt = budget.consume();

            let outcome = match self.check(handle).await {
                Ok(check) => {
                    self.emit_checked(handle, attempt, check.outcome);
                    match check.outcome {
                        CheckOutcome::Succeeded => {
                            info!(execution = %handle, attempt, "Review pipeline succeeded");
                            let body = check.payload.unwrap_or_default();
                            return Ok(PipelineOutcome::succeeded(body));
                        }
                        CheckOutcome::Failed => {
                            error!(execution = %handle, attempt, raw = %check.raw, "Review pipeline failed");
                            let body = check
                                .payload
                                .unwrap_or_else(|| serde_json::Value::String(check.raw.clone()));
                            return Err(ReviewflowError::PollFailure { body });
                        }
                        CheckOutcome::Pending => {
                            debug!(execution = %handle, attempt, status = ?check.status_label(), "Review pipeline still running");
                        }
                        CheckOutcome::Unknown => {
                            warn!(execution = %handle, attempt, status = ?check.status_label(), "Unrecognized pipeline status");
                        }
                        CheckOutcome::Malformed => {
                            warn!(execution = %handle, attempt, raw = %check.raw, "Malformed status response");
                        }
                    }
                    check.status_label().map(str::to_string)
                }
                Err(e) => {
                    self.emit_checked(handle, attempt, CheckOutcome::Malformed);
                    warn!(execution = %handle, attempt, error = %e, "Status check failed");
                    None
                }
            };
            if outcome.is_some() {
                last_status = outcome;
            }

            if budget.is_exhausted() {
                break;
            }
            let delay = budget.next_delay();
            if started.elapsed() + delay > self.policy.max_elapsed {
                warn!(
                    execution = %handle,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Polling wall-clock budget exhausted"
                );
                break;
            }
            tokio::time::sleep(delay).await;
        }

        error!(execution = %handle, attempts = budget.attempt, "Review pipeline did not finish in time");
        Err(ReviewflowError::PollTimeout {
            attempts: budget.attempt,
            last_status,
        })
    }

    fn emit_checked(&self, handle: &ExecutionHandle, attempt: u32, outcome: CheckOutcome) {
        self.events.emit(&PipelineEvent::PollChecked {
            handle: handle.to_string(),
            attempt,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::testing::{status_response, ScriptedReviewApi};
    use crate::client::transport::TransportResponse;
    use serde_json::json;

    fn handle() -> ExecutionHandle {
        ExecutionHandle::new("abc").unwrap()
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_nth_check_with_backoff_intervals() {
        let api = Arc::new(ScriptedReviewApi::new());
        for _ in 0..4 {
            api.push_status(Ok(status_response("RUNNING", json!({}))));
        }
        api.push_status(Ok(status_response("SUCCEEDED", json!({"output": {"ok": true}}))));

        let poller = Poller::new(api.clone());
        let outcome = poller.wait(&handle(), InputSize::Standard).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.body["output"], json!({"ok": true}));
        assert_eq!(api.status_calls(), 5);
        assert_eq!(
            api.status_gaps(),
            vec![secs(10), secs(20), secs(40), secs(50), secs(50)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_input_waits_longer_before_first_check() {
        let api = Arc::new(ScriptedReviewApi::new());
        api.push_status(Ok(status_response("SUCCEEDED", json!({}))));

        let poller = Poller::new(api.clone());
        poller.wait(&handle(), InputSize::Large).await.unwrap();
        assert_eq!(api.status_gaps(), vec![secs(20)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_exactly_deadline_attempts() {
        let api = Arc::new(ScriptedReviewApi::new());
        for _ in 0..20 {
            api.push_status(Ok(status_response("RUNNING", json!({}))));
        }

        let poller = Poller::new(api.clone());
        let err = poller
            .wait_with_deadline(&handle(), InputSize::Standard, 4)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReviewflowError::PollTimeout { attempts: 4, ref last_status } if last_status.as_deref() == Some("RUNNING")
        ));
        assert_eq!(api.status_calls(), 4);
        // Initial delay plus three waits; nothing after the last check.
        assert_eq!(
            api.status_gaps(),
            vec![secs(10), secs(20), secs(40), secs(50)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_is_terminal() {
        let api = Arc::new(ScriptedReviewApi::new());
        api.push_status(Ok(status_response("RUNNING", json!({}))));
        api.push_status(Ok(status_response("FAILED", json!({"error": "States.TaskFailed"}))));
        api.push_status(Ok(status_response("SUCCEEDED", json!({}))));

        let poller = Poller::new(api.clone());
        let err = poller.wait(&handle(), InputSize::Standard).await.unwrap_err();

        match err {
            ReviewflowError::PollFailure { body } => {
                assert_eq!(body["status"], "FAILED");
                assert_eq!(body["error"], "States.TaskFailed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(api.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_unknown_and_transport_errors_are_transient() {
        let api = Arc::new(ScriptedReviewApi::new());
        api.push_status(Ok(TransportResponse::new(200, "not json")));
        api.push_status(Ok(status_response("WEIRD", json!({}))));
        api.push_status(Err(ReviewflowError::Transport("timeout".to_string())));
        api.push_status(Ok(TransportResponse::new(502, r#"{"message":"Internal server error"}"#)));
        api.push_status(Ok(status_response("SUCCEEDED", json!({"result": "ok"}))));

        let events = Arc::new(CollectingEventSink::new());
        let poller = Poller::new(api.clone()).with_events(events.clone());
        let outcome = poller.wait(&handle(), InputSize::Standard).await.unwrap();

        assert_eq!(outcome.body["result"], "ok");
        assert_eq!(api.status_calls(), 5);
        let outcomes: Vec<CheckOutcome> = events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::PollChecked { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect();
        assert_eq!(
            outcomes,
            vec![
                CheckOutcome::Malformed,
                CheckOutcome::Unknown,
                CheckOutcome::Malformed,
                CheckOutcome::Malformed,
                CheckOutcome::Succeeded,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_ceiling_stops_polling() {
        let api = Arc::new(ScriptedReviewApi::new());
        for _ in 0..10 {
            api.push_status(Ok(status_response("RUNNING", json!({}))));
        }

        // 10s initial + 20s + 40s = 70s; the next 50s wait would cross 100s.
        let policy = PollPolicy::default().with_max_elapsed(secs(100));
        let poller = Poller::with_policy(api.clone(), policy);
        let err = poller.wait(&handle(), InputSize::Standard).await.unwrap_err();

        assert!(matches!(err, ReviewflowError::PollTimeout { attempts: 3, .. }));
        assert_eq!(api.status_calls(), 3);
    }

    #[test]
    fn test_policy_validate() {
        assert!(PollPolicy::default().validate().is_ok());
        let policy = PollPolicy {
            rate: 0.5,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
        assert!(PollPolicy::default()
            .with_deadline_attempts(0)
            .validate()
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shrinking_policy_is_rejected_before_polling() {
        let api = Arc::new(ScriptedReviewApi::new());
        api.push_status(Ok(status_response("RUNNING", json!({}))));

        let policy = PollPolicy {
            rate: 0.5,
            ..Default::default()
        };
        let start = Instant::now();
        let err = Poller::with_policy(api.clone(), policy)
            .wait_with_deadline(&handle(), InputSize::Standard, 4)
            .await
            .unwrap_err();

        assert!(matches!(err, ReviewflowError::Configuration(_)));
        assert_eq!(api.status_calls(), 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_deadline_is_rejected() {
        let api = Arc::new(ScriptedReviewApi::new());
        let err = Poller::new(api.clone())
            .wait_with_deadline(&handle(), InputSize::Standard, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, ReviewflowError::Configuration(_)));
        assert_eq!(api.status_calls(), 0);
    }

    #[test]
    fn test_initial_delay_buckets() {
        let policy = PollPolicy::default();
        assert_eq!(policy.initial_delay(InputSize::Standard), secs(10));
        assert_eq!(policy.initial_delay(InputSize::Large), secs(20));
    }
}
