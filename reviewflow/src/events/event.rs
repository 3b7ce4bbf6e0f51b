//! Typed lifecycle events.

use serde::Serialize;

use crate::core::{CheckOutcome, PipelineResult};
use crate::errors::ErrorClass;
use crate::pipeline::StageId;

/// A lifecycle event emitted by the poll loop or the stage orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// An orchestrated run started.
    #[serde(rename = "pipeline.started")]
    PipelineStarted {
        /// Execution handle of the run.
        execution: String,
    },
    /// A stage invocation is about to be made.
    #[serde(rename = "stage.started")]
    StageStarted {
        /// Stage being invoked.
        stage: StageId,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// A stage failed with a retryable class and will be invoked again.
    #[serde(rename = "stage.retry_scheduled")]
    StageRetryScheduled {
        /// Stage being retried.
        stage: StageId,
        /// Attempt that failed.
        attempt: u32,
        /// Wait before the next attempt.
        delay_ms: u64,
        /// Class of the failure.
        error_class: ErrorClass,
    },
    /// A stage produced its output.
    #[serde(rename = "stage.completed")]
    StageCompleted {
        /// Completed stage.
        stage: StageId,
        /// Invocations used.
        attempts: u32,
    },
    /// A stage failed for good.
    #[serde(rename = "stage.failed")]
    StageFailed {
        /// Failed stage.
        stage: StageId,
        /// Invocations used.
        attempts: u32,
        /// Class of the last failure.
        error_class: ErrorClass,
        /// Detail of the last failure.
        message: String,
    },
    /// An orchestrated run reached a terminal state.
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted {
        /// Execution handle of the run.
        execution: String,
        /// Terminal result.
        result: PipelineResult,
    },
    /// The poll loop classified one status response.
    #[serde(rename = "poll.checked")]
    PollChecked {
        /// Handle being polled.
        handle: String,
        /// 1-based check number.
        attempt: u32,
        /// Classification of the response.
        outcome: CheckOutcome,
    },
}

impl PipelineEvent {
    /// Returns the dotted event type (e.g. `stage.started`).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PipelineStarted { .. } => "pipeline.started",
            Self::StageStarted { .. } => "stage.started",
            Self::StageRetryScheduled { .. } => "stage.retry_scheduled",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::PipelineCompleted { .. } => "pipeline.completed",
            Self::PollChecked { .. } => "poll.checked",
        }
    }
}
