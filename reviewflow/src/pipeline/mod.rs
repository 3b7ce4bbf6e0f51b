//! Declarative review stage chain and its orchestrator.
//!
//! This module provides:
//! - The static stage table with per-stage input wiring
//! - Per-stage retry policies
//! - The invocation contract of the remote compute units
//! - The sequential orchestrator

mod definition;
mod invoker;
mod orchestrator;
mod retry;


pub use definition::{
    failure_notification, review_pipeline, InputMapping, InvocationTarget, NotifyPayload,
    StageAction, StageId, StageInput, StageInvocation, StageOutput,
};
#[cfg(feature = "http")]
pub use invoker::HttpStageInvoker;
pub use invoker::StageInvoker;
pub use orchestrator::{unwrap_output, OrchestrationReport, Orchestrator, PipelineState, StageRun};
pub use retry::{with_retry, JitterStrategy, RetryOutcome, RetryPolicy};
