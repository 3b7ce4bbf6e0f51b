//! Client for the remote review pipeline.
//!
//! This module provides:
//! - The transport seam ([`ReviewApi`]) and its HTTP implementation
//! - The trigger client with its fixed-interval retry budget
//! - Status classification
//! - The poll loop with exponential backoff

mod backoff;
mod classifier;
mod poll;
mod transport;
mod trigger;

pub use backoff::{next_interval, RetryBudget};
pub use classifier::classify;
pub use poll::{InputSize, PollPolicy, Poller};
#[cfg(feature = "http")]
pub use transport::HttpReviewApi;
pub use transport::{ReviewApi, TransportResponse};
pub use trigger::{TriggerClient, TriggerPolicy, MALFORMED_RESPONSE};
