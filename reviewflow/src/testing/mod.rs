//! Testing utilities for reviewflow.
//!
//! This module provides:
//! - Sample requests and canned envelopes
//! - Scripted doubles for the review API and the stage invoker

mod fixtures;
mod mocks;

pub use fixtures::{envelope, sample_request, status_response, trigger_response};
pub use mocks::{ScriptedInvoker, ScriptedReviewApi};
