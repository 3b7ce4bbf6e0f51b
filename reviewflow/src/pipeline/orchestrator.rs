//! Sequential stage orchestrator.
//!
//! Drives the stage table as a tagged state machine: each stage either
//! advances the run to the next declared stage or moves it to `Failed`,
//! skipping everything after it.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::definition::{
    failure_notification, review_pipeline, InvocationTarget, StageId, StageInput, StageInvocation,
    StageOutput,
};
use super::invoker::StageInvoker;
use super::retry::{with_retry, RetryOutcome, RetryPolicy};
use crate::core::{ExecutionHandle, PipelineOutcome, PipelineRequest};
use crate::envelope::Envelope;
use crate::errors::{ErrorClass, InvocationError, Result, ReviewflowError};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};

/// State of an orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    /// The given stage is about to run.
    Stage(StageId),
    /// Every stage completed.
    Succeeded,
    /// A stage failed for good.
    Failed,
}

impl PipelineState {
    /// Whether the run is over.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Record of one stage within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRun {
    /// Stage that ran.
    pub stage: StageId,
    /// Invocations made.
    pub attempts_used: u32,
    /// Last error seen, if the stage failed.
    pub last_error: Option<InvocationError>,
}

/// Result of [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestrationReport {
    /// Handle issued for the run.
    pub execution: ExecutionHandle,
    /// Terminal outcome.
    pub outcome: PipelineOutcome,
    /// Stages that ran, in order.
    pub runs: Vec<StageRun>,
    /// Failure notification, when one was sent.
    pub failure_notification: Option<StageRun>,
}

impl OrchestrationReport {
    /// Converts a failed report into a [`ReviewflowError::StageFailure`].
    pub fn into_result(self) -> Result<PipelineOutcome> {
        if self.outcome.is_success() {
            return Ok(self.outcome);
        }
        let failed = self
            .runs
            .into_iter()
            .rev()
            .find_map(|run| run.last_error.map(|source| (run.stage, run.attempts_used, source)));
        match failed {
            Some((stage, attempts, source)) => Err(ReviewflowError::StageFailure {
                stage: stage.to_string(),
                attempts,
                source,
            }),
            None => Err(ReviewflowError::PollFailure {
                body: self.outcome.body,
            }),
        }
    }
}

/// Runs the stage chain for one request.
#[derive(Clone)]
pub struct Orchestrator {
    invoker: Arc<dyn StageInvoker>,
    stages: Vec<StageInvocation>,
    events: Arc<dyn EventSink>,
    notify_on_failure: bool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.stages.iter().map(|s| s.id).collect::<Vec<_>>())
            .field("notify_on_failure", &self.notify_on_failure)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator for the review chain.
    pub fn new(invoker: Arc<dyn StageInvoker>) -> Self {
        Self {
            invoker,
            stages: review_pipeline(),
            events: Arc::new(NoOpEventSink),
            notify_on_failure: false,
        }
    }

    /// Replaces the stage table.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<StageInvocation>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sends a notification when the chain fails.
    #[must_use]
    pub fn with_notify_on_failure(mut self, enabled: bool) -> Self {
        self.notify_on_failure = enabled;
        self
    }

    fn state_at(&self, index: usize) -> PipelineState {
        self.stages
            .get(index)
            .map_or(PipelineState::Succeeded, |stage| PipelineState::Stage(stage.id))
    }

    /// Runs every stage in order.
    ///
    /// Returns `Err` only for an invalid request. Stage failures end in a
    /// report whose outcome is [`crate::core::PipelineResult::Failed`] with the body
    /// `{stage, error_class, message, attempts}`.
    pub async fn run(&self, request: &PipelineRequest) -> Result<OrchestrationReport> {
        request.validate()?;

        let execution = ExecutionHandle::generate();
        info!(execution = %execution, repository = %request.full_name(), pr = request.pull_request_number, "Starting review pipeline");
        self.events.emit(&PipelineEvent::PipelineStarted {
            execution: execution.to_string(),
        });

        let mut runs = Vec::with_capacity(self.stages.len());
        let mut previous: Option<StageOutput> = None;
        let mut failure: Option<Value> = None;
        let mut index = 0;
        let mut state = self.state_at(index);

        while let PipelineState::Stage(id) = state {
            let stage = &self.stages[index];
            let input = StageInput {
                request,
                previous: previous.as_ref(),
            };
            let RetryOutcome { result, attempts } = self.run_stage(stage, &input).await;

            match result {
                Ok(output) => {
                    info!(execution = %execution, stage = %id, attempts, "Stage completed");
                    self.events.emit(&PipelineEvent::StageCompleted { stage: id, attempts });
                    runs.push(StageRun {
                        stage: id,
                        attempts_used: attempts,
                        last_error: None,
                    });
                    previous = Some(output);
                    index += 1;
                    state = self.state_at(index);
                }
                Err(err) => {
                    error!(execution = %execution, stage = %id, attempts, error = %err, "Stage failed");
                    self.events.emit(&PipelineEvent::StageFailed {
                        stage: id,
                        attempts,
                        error_class: err.class,
                        message: err.message.clone(),
                    });
                    let mut diagnostic = err.to_diagnostic();
                    diagnostic["stage"] = json!(id);
                    diagnostic["attempts"] = json!(attempts);
                    failure = Some(diagnostic);
                    runs.push(StageRun {
                        stage: id,
                        attempts_used: attempts,
                        last_error: Some(err),
                    });
                    state = PipelineState::Failed;
                }
            }
        }

        let (outcome, failure_notification) = match failure {
            None => {
                let body = previous.map(|output| output.body).unwrap_or(Value::Null);
                (PipelineOutcome::succeeded(body), None)
            }
            Some(diagnostic) => {
                let notified = if self.should_notify(&runs) {
                    Some(self.notify_failure(request, &diagnostic).await)
                } else {
                    None
                };
                (PipelineOutcome::failed(diagnostic), notified)
            }
        };

        info!(execution = %execution, result = %outcome.result, "Review pipeline finished");
        self.events.emit(&PipelineEvent::PipelineCompleted {
            execution: execution.to_string(),
            result: outcome.result,
        });

        Ok(OrchestrationReport {
            execution,
            outcome,
            runs,
            failure_notification,
        })
    }

    async fn run_stage(&self, stage: &StageInvocation, input: &StageInput<'_>) -> RetryOutcome<StageOutput> {
        let payload = match (stage.input_mapping)(input) {
            Ok(payload) => payload,
            Err(e) => {
                return RetryOutcome {
                    result: Err(InvocationError::new(ErrorClass::InvalidInput, e.to_string())),
                    attempts: u32::from(stage.is_local()),
                }
            }
        };

        let Some(target) = stage.target else {
            self.events.emit(&PipelineEvent::StageStarted {
                stage: stage.id,
                attempt: 1,
            });
            return RetryOutcome {
                result: Ok(StageOutput::from_body(payload)),
                attempts: 1,
            };
        };

        self.invoke_with_retry(stage.id, target, &stage.retry, payload)
            .await
    }

    async fn invoke_with_retry(
        &self,
        stage: StageId,
        target: InvocationTarget,
        policy: &RetryPolicy,
        payload: Value,
    ) -> RetryOutcome<StageOutput> {
        let invoker = self.invoker.as_ref();
        with_retry(policy, stage, self.events.as_ref(), move |_| {
            let payload = payload.clone();
            async move {
                let raw = invoker.invoke(target, payload).await?;
                unwrap_output(&raw)
            }
        })
        .await
    }

    fn should_notify(&self, runs: &[StageRun]) -> bool {
        self.notify_on_failure
            && !runs.iter().any(|run| run.stage == StageId::Notify)
    }

    async fn notify_failure(&self, request: &PipelineRequest, diagnostic: &Value) -> StageRun {
        let policy = self
            .stages
            .iter()
            .find(|s| s.target == Some(InvocationTarget::Notify))
            .map_or_else(RetryPolicy::notification, |s| s.retry.clone());

        let outcome = match failure_notification(request, diagnostic) {
            Ok(payload) => {
                self.invoke_with_retry(StageId::Notify, InvocationTarget::Notify, &policy, payload)
                    .await
            }
            Err(e) => RetryOutcome {
                result: Err(InvocationError::new(ErrorClass::InvalidInput, e.to_string())),
                attempts: 0,
            },
        };

        let last_error = match outcome.result {
            Ok(_) => {
                info!(attempts = outcome.attempts, "Failure notification sent");
                None
            }
            Err(e) => {
                warn!(attempts = outcome.attempts, error = %e, "Failure notification could not be sent");
                Some(e)
            }
        };
        StageRun {
            stage: StageId::Notify,
            attempts_used: outcome.attempts,
            last_error,
        }
    }
}

/// Unwraps a compute unit's envelope into a stage output.
///
/// A non-2xx `statusCode` is a task failure; an unreadable envelope is
/// malformed output. Neither is retried by the standard policies.
pub fn unwrap_output(raw: &Value) -> std::result::Result<StageOutput, InvocationError> {
    let envelope = Envelope::from_value(raw)
        .map_err(|e| InvocationError::new(ErrorClass::MalformedOutput, e.to_string()))?;
    if !envelope.is_success() {
        let code = envelope.status_code.unwrap_or_default();
        return Err(InvocationError::task_failed(format!(
            "statusCode {code}: {}",
            envelope.raw_body
        )));
    }
    Ok(StageOutput {
        body: envelope.body,
        raw_body: envelope.raw_body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineResult;
    use crate::events::CollectingEventSink;
    use crate::pipeline::invoker::MockStageInvoker;
    use crate::testing::{envelope, sample_request};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::Instant;

    fn is_action(payload: &Value, action: &str) -> bool {
        payload["action"] == action
    }

    fn expect_happy_tail(invoker: &mut MockStageInvoker) {
        invoker
            .expect_invoke()
            .withf(|_, p| is_action(p, "generate_review"))
            .times(1)
            .returning(|_, _| Ok(envelope(200, &json!({"reviews": [{"path": "a.rs", "body": "nit"}]}))));
        invoker
            .expect_invoke()
            .withf(|_, p| is_action(p, "post_comments"))
            .times(1)
            .returning(|_, _| Ok(envelope(200, &json!({"result": {"successful_posts": 1, "failed_posts": 0}}))));
        invoker
            .expect_invoke()
            .withf(|target, _| *target == InvocationTarget::Notify)
            .times(1)
            .returning(|_, _| Ok(envelope(200, &json!({"status": "sent"}))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_invokes_once() {
        let mut invoker = MockStageInvoker::new();
        invoker
            .expect_invoke()
            .times(1)
            .returning(|_, _| Ok(envelope(400, &json!({"error": "Missing parameters"}))));

        let report = Orchestrator::new(Arc::new(invoker))
            .run(&sample_request())
            .await
            .unwrap();

        assert_eq!(report.outcome.result, PipelineResult::Failed);
        assert_eq!(report.outcome.body["stage"], "fetch_changes");
        assert_eq!(report.outcome.body["error_class"], "task_failed");
        assert_eq!(report.outcome.body["attempts"], 1);
        assert_eq!(report.runs.len(), 1);
        assert!(report.failure_notification.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_succeeds_on_fourth_attempt() {
        let mut invoker = MockStageInvoker::new();
        let mut fetch_calls = 0;
        invoker
            .expect_invoke()
            .withf(|_, p| is_action(p, "fetch_changes"))
            .times(4)
            .returning(move |_, _| {
                fetch_calls += 1;
                if fetch_calls < 4 {
                    Err(InvocationError::throttled("Lambda.TooManyRequestsException"))
                } else {
                    Ok(envelope(200, &json!({"changes": [{"filename": "a.rs"}]})))
                }
            });
        expect_happy_tail(&mut invoker);

        let start = Instant::now();
        let report = Orchestrator::new(Arc::new(invoker))
            .run(&sample_request())
            .await
            .unwrap();

        assert!(report.outcome.is_success());
        assert_eq!(report.outcome.body, json!({"status": "sent"}));
        assert_eq!(report.runs[0].attempts_used, 4);
        assert_eq!(start.elapsed(), Duration::from_secs(2 + 4 + 8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_the_run() {
        let mut invoker = MockStageInvoker::new();
        invoker
            .expect_invoke()
            .times(6)
            .returning(|_, _| Err(InvocationError::service("Lambda.ServiceException")));

        let events = Arc::new(CollectingEventSink::new());
        let report = Orchestrator::new(Arc::new(invoker))
            .with_events(events.clone())
            .run(&sample_request())
            .await
            .unwrap();

        assert_eq!(report.outcome.body["attempts"], 6);
        assert_eq!(report.outcome.body["error_class"], "service_exception");
        assert_eq!(events.events_of_type("stage.retry_scheduled").len(), 5);
        assert_eq!(events.events_of_type("stage.failed").len(), 1);

        let err = report.into_result().unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::BudgetExhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_envelope_is_not_retried() {
        let mut invoker = MockStageInvoker::new();
        invoker
            .expect_invoke()
            .times(1)
            .returning(|_, _| Ok(json!({"statusCode": 200, "body": "{broken"})));

        let report = Orchestrator::new(Arc::new(invoker))
            .run(&sample_request())
            .await
            .unwrap();
        assert_eq!(report.outcome.body["error_class"], "malformed_output");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_notification_when_enabled() {
        let mut invoker = MockStageInvoker::new();
        invoker
            .expect_invoke()
            .withf(|_, p| is_action(p, "fetch_changes"))
            .times(1)
            .returning(|_, _| Ok(envelope(502, &json!({"error": "GitHub error"}))));
        invoker
            .expect_invoke()
            .withf(|target, p| {
                *target == InvocationTarget::Notify && p["result"]["error"]["stage"] == "fetch_changes"
            })
            .times(1)
            .returning(|_, _| Ok(envelope(200, &json!({"status": "sent"}))));

        let report = Orchestrator::new(Arc::new(invoker))
            .with_notify_on_failure(true)
            .run(&sample_request())
            .await
            .unwrap();

        assert_eq!(report.outcome.result, PipelineResult::Failed);
        let notification = report.failure_notification.unwrap();
        assert_eq!(notification.attempts_used, 1);
        assert!(notification.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_rejected_before_any_stage() {
        let mut invoker = MockStageInvoker::new();
        invoker.expect_invoke().times(0);

        let request = sample_request().with_author("");
        let err = Orchestrator::new(Arc::new(invoker))
            .run(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewflowError::InvalidInput(_)));
    }

    #[test]
    fn test_unwrap_output() {
        let output = unwrap_output(&envelope(200, &json!({"changes": []}))).unwrap();
        assert_eq!(output.body, json!({"changes": []}));
        assert_eq!(output.raw_body, r#"{"changes":[]}"#);

        let err = unwrap_output(&envelope(500, &json!({"error": "Internal server error"}))).unwrap_err();
        assert_eq!(err.class, ErrorClass::TaskFailed);
        assert!(err.message.starts_with("statusCode 500"));

        let err = unwrap_output(&json!("nope")).unwrap_err();
        assert_eq!(err.class, ErrorClass::MalformedOutput);
    }

    #[test]
    fn test_pipeline_state_terminal() {
        assert!(!PipelineState::Stage(StageId::Notify).is_terminal());
        assert!(PipelineState::Succeeded.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
    }
}
