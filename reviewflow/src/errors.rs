//! Error types for reviewflow.
//!
//! The taxonomy separates transient infrastructure failures, which retry
//! budgets absorb, from malformed responses, terminal business failures and
//! exhausted budgets, which always surface to the caller with enough payload
//! to explain the terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = ReviewflowError> = std::result::Result<T, E>;

/// The main error type for reviewflow operations.
#[derive(Debug, Error)]
pub enum ReviewflowError {
    /// The pipeline could not be started.
    #[error("Trigger failed after {attempts} attempt(s): {reason}")]
    TriggerFailure {
        /// Attempts consumed before giving up.
        attempts: u32,
        /// Why the last attempt failed.
        reason: String,
    },

    /// No terminal status was observed within the polling budget.
    #[error("Polling timed out after {attempts} status check(s)")]
    PollTimeout {
        /// Status checks performed.
        attempts: u32,
        /// Last status string reported by the endpoint, if any.
        last_status: Option<String>,
    },

    /// The pipeline reported a terminal FAILED status.
    #[error("Pipeline execution failed: {body}")]
    PollFailure {
        /// Inner status body, kept for diagnostics.
        body: serde_json::Value,
    },

    /// A stage exhausted its retry policy or hit a non-retryable error.
    #[error("Stage '{stage}' failed after {attempts} attempt(s): {source}")]
    StageFailure {
        /// Stage name.
        stage: String,
        /// Invocations made.
        attempts: u32,
        /// Last invocation error.
        #[source]
        source: InvocationError,
    },

    /// A transport-level failure (connection error, timeout, client setup).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A transport envelope could not be unwrapped.
    #[error("{0}")]
    Envelope(#[from] EnvelopeError),

    /// Caller-supplied input was rejected.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is incomplete or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ReviewflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for ReviewflowError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Coarse classification of a [`ReviewflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeouts, service exceptions, throttling. Retryable within budget.
    TransientInfra,
    /// Structurally broken payload.
    MalformedResponse,
    /// Explicit FAILED status or stage failure. Never retried.
    BusinessFailure,
    /// Attempts or wall-clock ceiling reached.
    BudgetExhausted,
    /// Caller handed in something unusable.
    InvalidInput,
    /// Broken configuration.
    Configuration,
}

impl ReviewflowError {
    /// Classifies the error into the crate's failure taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TriggerFailure { .. } | Self::PollTimeout { .. } => ErrorKind::BudgetExhausted,
            Self::PollFailure { .. } => ErrorKind::BusinessFailure,
            Self::StageFailure { source, .. } => {
                if source.class.is_transient() {
                    ErrorKind::BudgetExhausted
                } else {
                    ErrorKind::BusinessFailure
                }
            }
            Self::Transport(_) | Self::Io(_) => ErrorKind::TransientInfra,
            Self::Envelope(_) | Self::Serialization(_) => ErrorKind::MalformedResponse,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Failure to unwrap a transport envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The outer document is not JSON at all.
    #[error("response is not valid JSON: {0}")]
    NotJson(String),

    /// The outer document has no usable `body` field.
    #[error("response envelope has no body field")]
    MissingBody,

    /// The serialized inner body does not parse.
    #[error("envelope body is not valid JSON: {0}")]
    InvalidBody(String),
}

/// Error class reported by a stage invocation.
///
/// Retry policies list the classes they retry; anything else fails the stage
/// on the first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The invocation did not answer in time.
    InvocationTimeout,
    /// The invocation service raised an exception.
    ServiceException,
    /// The invocation was throttled.
    Throttled,
    /// The compute unit ran and reported a failure.
    TaskFailed,
    /// The compute unit answered with an unreadable envelope.
    MalformedOutput,
    /// The stage input could not be built.
    InvalidInput,
}

impl ErrorClass {
    /// Transient infrastructure classes.
    pub const TRANSIENT: [Self; 3] = [Self::InvocationTimeout, Self::ServiceException, Self::Throttled];

    /// Returns true for transient infrastructure classes.
    #[must_use]
    pub fn is_transient(self) -> bool {
        Self::TRANSIENT.contains(&self)
    }

    /// Returns the wire name of the class.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvocationTimeout => "invocation_timeout",
            Self::ServiceException => "service_exception",
            Self::Throttled => "throttled",
            Self::TaskFailed => "task_failed",
            Self::MalformedOutput => "malformed_output",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure of one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{class}: {message}")]
pub struct InvocationError {
    /// Error class used for retry decisions.
    pub class: ErrorClass,
    /// Human-readable detail.
    pub message: String,
}

impl InvocationError {
    /// Creates a new invocation error.
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// Invocation timed out.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvocationTimeout, message)
    }

    /// Invocation service exception.
    pub fn service(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::ServiceException, message)
    }

    /// Invocation throttled.
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Throttled, message)
    }

    /// The compute unit reported a failure.
    pub fn task_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::TaskFailed, message)
    }

    /// Serializes to the diagnostic shape used in failed outcomes.
    #[must_use]
    pub fn to_diagnostic(&self) -> serde_json::Value {
        serde_json::json!({
            "error_class": self.class.as_str(),
            "message": self.message,
        })
    }
}
