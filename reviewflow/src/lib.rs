//! # Reviewflow
//!
//! Client and orchestrator for a remote, multi-stage pull request review
//! pipeline.
//!
//! Reviewflow provides:
//!
//! - **Trigger client**: starts a pipeline run with a fixed-interval retry budget
//! - **Poll loop**: tracks the run with exponential backoff up to a deadline
//! - **Status classification**: maps raw status envelopes to typed outcomes
//! - **Stage orchestrator**: sequences the review stages with per-stage retry
//!   policies and threads payloads between them
//! - **Event-driven observability**: typed lifecycle events through pluggable sinks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reviewflow::prelude::*;
//!
//! let config = ReviewflowConfig::new().with_env_overrides();
//! let api = Arc::new(HttpReviewApi::new(&config.api)?);
//!
//! let handle = TriggerClient::with_policy(api.clone(), config.trigger.clone())
//!     .start(&request)
//!     .await?;
//! let outcome = Poller::with_policy(api, config.poll.clone())
//!     .wait(&handle, InputSize::Standard)
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod client;
pub mod config;
pub mod core;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    #[cfg(feature = "http")]
    pub use crate::client::HttpReviewApi;
    pub use crate::client::{
        classify, InputSize, PollPolicy, Poller, ReviewApi, TriggerClient, TriggerPolicy,
    };
    pub use crate::config::ReviewflowConfig;
    pub use crate::core::{
        CheckOutcome, ExecutionHandle, PipelineOutcome, PipelineRequest, PipelineResult,
        StatusCheckResult,
    };
    pub use crate::errors::{ErrorClass, ErrorKind, InvocationError, Result, ReviewflowError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    #[cfg(feature = "http")]
    pub use crate::pipeline::HttpStageInvoker;
    pub use crate::pipeline::{
        OrchestrationReport, Orchestrator, RetryPolicy, StageId, StageInvoker,
    };
}
