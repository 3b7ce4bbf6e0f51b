//! Trigger client: starts a pipeline run and returns its handle.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::backoff::RetryBudget;
use super::transport::ReviewApi;
use crate::config::duration_secs;
use crate::core::{ExecutionHandle, PipelineRequest};
use crate::envelope::Envelope;
use crate::errors::{Result, ReviewflowError};

/// Reason reported when a 2xx trigger response cannot be unwrapped.
pub const MALFORMED_RESPONSE: &str = "malformed response";

/// Fixed-interval retry policy for the trigger call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerPolicy {
    /// Attempts allowed in total.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait between attempts. Does not grow.
    #[serde(default = "default_interval", with = "duration_secs")]
    pub interval: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval: default_interval(),
        }
    }
}

impl TriggerPolicy {
    /// Checks the policy is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ReviewflowError::configuration("trigger.max_attempts must be at least 1"));
        }
        Ok(())
    }

    fn budget(&self) -> RetryBudget {
        RetryBudget::fixed(self.max_attempts, self.interval)
    }
}

/// Submits review requests to the trigger endpoint.
#[derive(Clone)]
pub struct TriggerClient {
    api: Arc<dyn ReviewApi>,
    policy: TriggerPolicy,
}

impl std::fmt::Debug for TriggerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TriggerClient {
    /// Creates a trigger client with the default policy.
    pub fn new(api: Arc<dyn ReviewApi>) -> Self {
        Self::with_policy(api, TriggerPolicy::default())
    }

    /// Creates a trigger client with an explicit policy.
    pub fn with_policy(api: Arc<dyn ReviewApi>, policy: TriggerPolicy) -> Self {
        Self { api, policy }
    }

    /// Starts a pipeline run for `request`.
    ///
    /// Transport failures and non-2xx responses consume one attempt each. A 2xx
    /// response that cannot be unwrapped into an execution identifier fails
    /// immediately with [`MALFORMED_RESPONSE`]; that is not a transient error.
    /// An unusable policy is rejected before any call is made.
    pub async fn start(&self, request: &PipelineRequest) -> Result<ExecutionHandle> {
        self.policy.validate()?;
        request.validate()?;
        let payload = serde_json::to_value(request)?;
        debug!(payload = %payload, "Serialized review request");

        let mut budget = self.policy.budget();
        loop {
            let attempt = budget.consume();
            let reason = match self.api.start_review(&payload).await {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, body = %response.body, "Trigger response");
                    return match extract_handle(&response.body) {
                        Some(handle) => {
                            info!(execution = %handle, attempt, "Review pipeline started");
                            Ok(handle)
                        }
                        None => {
                            error!(body = %response.body, "Trigger response carries no execution identifier");
                            Err(ReviewflowError::TriggerFailure {
                                attempts: attempt,
                                reason: MALFORMED_RESPONSE.to_string(),
                            })
                        }
                    };
                }
                Ok(response) => format!("HTTP {}: {}", response.status, response.body),
                Err(e) => e.to_string(),
            };

            if budget.is_exhausted() {
                error!(attempts = budget.attempt, reason = %reason, "Trigger attempts exhausted");
                return Err(ReviewflowError::TriggerFailure {
                    attempts: budget.attempt,
                    reason,
                });
            }

            let delay = budget.next_delay();
            warn!(
                attempt,
                remaining = budget.remaining(),
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Trigger attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn extract_handle(body: &str) -> Option<ExecutionHandle> {
    let envelope = Envelope::parse(body).ok()?;
    envelope
        .body_str("execution_arn")
        .and_then(|arn| ExecutionHandle::new(arn).ok())
}
