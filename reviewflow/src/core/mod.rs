//! Core domain model types for reviewflow.
//!
//! This module contains the fundamental types shared by the client and the
//! stage orchestrator:
//! - The pull request review request
//! - Execution handles
//! - Status check and pipeline outcomes

mod handle;
mod request;
mod status;

pub use handle::ExecutionHandle;
pub use request::PipelineRequest;
pub use status::{CheckOutcome, ExecutionTimes, PipelineOutcome, PipelineResult, StatusCheckResult};
