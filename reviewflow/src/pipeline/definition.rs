//! Static definition of the review stage chain.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use super::retry::RetryPolicy;
use crate::core::PipelineRequest;
use crate::envelope::decode_value;
use crate::errors::{Result, ReviewflowError};

/// Identifier of one stage in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Collects the changed files of the pull request.
    FetchChanges,
    /// Produces review comments for the changes.
    GenerateReview,
    /// Posts the comments on the pull request.
    PostComments,
    /// Local reshaping of the post result into the notification payload.
    ReshapeResult,
    /// Sends the notification.
    Notify,
}

impl StageId {
    /// Returns the snake_case name of the stage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchChanges => "fetch_changes",
            Self::GenerateReview => "generate_review",
            Self::PostComments => "post_comments",
            Self::ReshapeResult => "reshape_result",
            Self::Notify => "notify",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote compute unit a stage invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationTarget {
    /// The review compute unit, dispatching on `action`.
    Review,
    /// The notification compute unit.
    Notify,
}

/// Typed request to the review compute unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StageAction {
    /// Collect the changed files.
    FetchChanges {
        /// Repository name.
        repository: String,
        /// Pull request number.
        pull_request_number: u64,
        /// Repository owner.
        owner: String,
    },
    /// Review the collected changes.
    GenerateReview {
        /// Serialized fetch output, `{"changes": [...]}`.
        changes: String,
    },
    /// Post the review comments.
    PostComments {
        /// Repository name.
        repository: String,
        /// Pull request number.
        pull_request_number: u64,
        /// Repository owner.
        owner: String,
        /// Comments produced by the review stage.
        reviews: Value,
    },
}

impl StageAction {
    /// Returns the wire name of the action.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchChanges { .. } => "fetch_changes",
            Self::GenerateReview { .. } => "generate_review",
            Self::PostComments { .. } => "post_comments",
        }
    }

    /// Checks the fields the compute unit requires.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        match self {
            Self::FetchChanges {
                repository,
                pull_request_number,
                owner,
            } => {
                check_target(&mut missing, repository, *pull_request_number, owner);
            }
            Self::GenerateReview { changes } => {
                if changes.trim().is_empty() {
                    missing.push("changes");
                }
            }
            Self::PostComments {
                repository,
                pull_request_number,
                owner,
                reviews,
            } => {
                check_target(&mut missing, repository, *pull_request_number, owner);
                if is_empty_value(reviews) {
                    missing.push("reviews");
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReviewflowError::invalid_input(format!(
                "missing parameters for {}: {}",
                self.name(),
                missing.join(", ")
            )))
        }
    }

    /// Validates and serializes the action.
    pub fn into_payload(self) -> Result<Value> {
        self.validate()?;
        Ok(serde_json::to_value(self)?)
    }
}

fn check_target(missing: &mut Vec<&'static str>, repository: &str, number: u64, owner: &str) {
    if repository.trim().is_empty() {
        missing.push("repository");
    }
    if number == 0 {
        missing.push("pull_request_number");
    }
    if owner.trim().is_empty() {
        missing.push("owner");
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Payload accepted by the notification compute unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyPayload {
    /// Repository name.
    pub repository: String,
    /// Pull request number.
    pub pull_request_number: u64,
    /// Repository owner.
    pub owner: String,
    /// Post statistics (`successful_posts`, `failed_posts`) or `{error}`.
    pub result: Value,
}

impl NotifyPayload {
    /// Keys the notification unit requires.
    pub const REQUIRED_KEYS: [&'static str; 4] = ["repository", "pull_request_number", "owner", "result"];

    /// Builds a payload for `request`.
    pub fn for_request(request: &PipelineRequest, result: Value) -> Self {
        Self {
            repository: request.repository.clone(),
            pull_request_number: request.pull_request_number,
            owner: request.owner.clone(),
            result,
        }
    }

    /// Reads a payload from a document, reporting every missing key.
    pub fn from_value(value: &Value) -> Result<Self> {
        let missing: Vec<&str> = Self::REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| value.get(*key).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(ReviewflowError::invalid_input(format!(
                "missing keys: {}",
                missing.join(", ")
            )));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| ReviewflowError::invalid_input(format!("invalid notification payload: {e}")))
    }

    /// Serializes the payload.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Unwrapped output of a completed stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    /// Parsed inner body.
    pub body: Value,
    /// Inner body as serialized on the wire.
    pub raw_body: String,
}

impl StageOutput {
    /// Creates an output from a parsed body.
    pub fn from_body(body: Value) -> Self {
        let raw_body = body.to_string();
        Self { body, raw_body }
    }
}

/// What an input mapping can read.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    /// The request that started the run.
    pub request: &'a PipelineRequest,
    /// Output of the previous stage, if any.
    pub previous: Option<&'a StageOutput>,
}

impl<'a> StageInput<'a> {
    /// Returns the previous output or an input error.
    pub fn previous(&self) -> Result<&'a StageOutput> {
        self.previous
            .ok_or_else(|| ReviewflowError::invalid_input("stage has no previous output"))
    }
}

/// Builds a stage's payload from its input.
pub type InputMapping = fn(&StageInput<'_>) -> Result<Value>;

/// One entry of the stage table.
#[derive(Debug, Clone)]
pub struct StageInvocation {
    /// Stage identifier.
    pub id: StageId,
    /// Remote unit to invoke; `None` for a local transform whose mapping
    /// output is the stage output.
    pub target: Option<InvocationTarget>,
    /// Payload builder.
    pub input_mapping: InputMapping,
    /// Retry behaviour.
    pub retry: RetryPolicy,
}

impl StageInvocation {
    /// Whether the stage runs locally.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.target.is_none()
    }
}

/// The review chain: fetch, review, post, reshape, notify.
#[must_use]
pub fn review_pipeline() -> Vec<StageInvocation> {
    vec![
        StageInvocation {
            id: StageId::FetchChanges,
            target: Some(InvocationTarget::Review),
            input_mapping: fetch_changes_input,
            retry: RetryPolicy::content_stage(),
        },
        StageInvocation {
            id: StageId::GenerateReview,
            target: Some(InvocationTarget::Review),
            input_mapping: generate_review_input,
            retry: RetryPolicy::content_stage(),
        },
        StageInvocation {
            id: StageId::PostComments,
            target: Some(InvocationTarget::Review),
            input_mapping: post_comments_input,
            retry: RetryPolicy::content_stage(),
        },
        StageInvocation {
            id: StageId::ReshapeResult,
            target: None,
            input_mapping: reshape_result,
            retry: RetryPolicy::none(),
        },
        StageInvocation {
            id: StageId::Notify,
            target: Some(InvocationTarget::Notify),
            input_mapping: notify_input,
            retry: RetryPolicy::notification(),
        },
    ]
}

fn fetch_changes_input(input: &StageInput<'_>) -> Result<Value> {
    let request = input.request;
    StageAction::FetchChanges {
        repository: request.repository.clone(),
        pull_request_number: request.pull_request_number,
        owner: request.owner.clone(),
    }
    .into_payload()
}

fn generate_review_input(input: &StageInput<'_>) -> Result<Value> {
    StageAction::GenerateReview {
        changes: input.previous()?.raw_body.clone(),
    }
    .into_payload()
}

fn post_comments_input(input: &StageInput<'_>) -> Result<Value> {
    let request = input.request;
    let reviews = input
        .previous()?
        .body
        .get("reviews")
        .cloned()
        .unwrap_or(Value::Null);
    StageAction::PostComments {
        repository: request.repository.clone(),
        pull_request_number: request.pull_request_number,
        owner: request.owner.clone(),
        reviews,
    }
    .into_payload()
}

fn reshape_result(input: &StageInput<'_>) -> Result<Value> {
    let previous = input.previous()?;
    let result = previous
        .body
        .get("result")
        .ok_or_else(|| ReviewflowError::invalid_input("post_comments output has no result"))?;
    let result = decode_value(result)?;
    NotifyPayload::for_request(input.request, result).to_value()
}

fn notify_input(input: &StageInput<'_>) -> Result<Value> {
    NotifyPayload::from_value(&input.previous()?.body)?.to_value()
}

/// Payload sent to the notification unit when the chain fails.
pub fn failure_notification(request: &PipelineRequest, diagnostic: &Value) -> Result<Value> {
    NotifyPayload::for_request(request, json!({ "error": diagnostic })).to_value()
}
