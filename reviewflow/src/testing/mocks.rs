//! Scripted test doubles for the transport seams.
//!
//! Unlike `mockall` expectations these replay a queue of responses and record
//! what they were asked, which suits timing assertions under a paused clock.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use crate::client::{ReviewApi, TransportResponse};
use crate::core::ExecutionHandle;
use crate::errors::{InvocationError, Result, ReviewflowError};
use crate::pipeline::{InvocationTarget, StageInvoker};

/// A [`ReviewApi`] replaying queued responses.
///
/// An empty queue answers with a transport error.
#[derive(Debug)]
pub struct ScriptedReviewApi {
    created: Instant,
    triggers: Mutex<VecDeque<Result<TransportResponse>>>,
    statuses: Mutex<VecDeque<Result<TransportResponse>>>,
    trigger_payloads: Mutex<Vec<Value>>,
    status_calls: Mutex<Vec<(ExecutionHandle, Instant)>>,
}

impl Default for ScriptedReviewApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedReviewApi {
    /// Creates an empty script. Status gaps are measured from this instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            triggers: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            trigger_payloads: Mutex::new(Vec::new()),
            status_calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a trigger response.
    pub fn push_trigger(&self, response: Result<TransportResponse>) {
        self.triggers.lock().push_back(response);
    }

    /// Queues a status response.
    pub fn push_status(&self, response: Result<TransportResponse>) {
        self.statuses.lock().push_back(response);
    }

    /// Payloads received by `start_review`.
    #[must_use]
    pub fn trigger_payloads(&self) -> Vec<Value> {
        self.trigger_payloads.lock().clone()
    }

    /// Number of status checks made.
    #[must_use]
    pub fn status_calls(&self) -> usize {
        self.status_calls.lock().len()
    }

    /// Handles passed to each status check.
    #[must_use]
    pub fn fetched_handles(&self) -> Vec<String> {
        self.status_calls
            .lock()
            .iter()
            .map(|(handle, _)| handle.to_string())
            .collect()
    }

    /// Time between consecutive status checks, the first measured from
    /// construction.
    #[must_use]
    pub fn status_gaps(&self) -> Vec<Duration> {
        let calls = self.status_calls.lock();
        let mut last = self.created;
        calls
            .iter()
            .map(|(_, at)| {
                let gap = at.duration_since(last);
                last = *at;
                gap
            })
            .collect()
    }
}

#[async_trait]
impl ReviewApi for ScriptedReviewApi {
    async fn start_review(&self, payload: &Value) -> Result<TransportResponse> {
        self.trigger_payloads.lock().push(payload.clone());
        self.triggers
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ReviewflowError::Transport("no scripted trigger response".to_string())))
    }

    async fn fetch_status(&self, handle: &ExecutionHandle) -> Result<TransportResponse> {
        self.status_calls.lock().push((handle.clone(), Instant::now()));
        self.statuses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ReviewflowError::Transport("no scripted status response".to_string())))
    }
}

/// A [`StageInvoker`] replaying queued responses per action.
///
/// Review invocations are keyed by their `action`; notifications by
/// `"notify"`. An empty queue answers with a task failure.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    responses: Mutex<HashMap<String, VecDeque<std::result::Result<Value, InvocationError>>>>,
    calls: Mutex<Vec<(InvocationTarget, Value)>>,
}

impl ScriptedInvoker {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for `key` (an action name or `"notify"`).
    pub fn push(&self, key: &str, response: std::result::Result<Value, InvocationError>) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(response);
    }

    /// Every invocation made, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(InvocationTarget, Value)> {
        self.calls.lock().clone()
    }

    /// Number of invocations made for `key`.
    #[must_use]
    pub fn call_count(&self, key: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(target, payload)| Self::key(*target, payload) == key)
            .count()
    }

    fn key(target: InvocationTarget, payload: &Value) -> String {
        match target {
            InvocationTarget::Notify => "notify".to_string(),
            InvocationTarget::Review => payload["action"].as_str().unwrap_or_default().to_string(),
        }
    }
}

#[async_trait]
impl StageInvoker for ScriptedInvoker {
    async fn invoke(&self, target: InvocationTarget, payload: Value) -> std::result::Result<Value, InvocationError> {
        let key = Self::key(target, &payload);
        self.calls.lock().push((target, payload));
        self.responses
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(InvocationError::task_failed(format!("no scripted response for {key}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_scripted_api_replays_in_order() {
        let api = ScriptedReviewApi::new();
        api.push_status(Ok(TransportResponse::new(200, "first")));
        api.push_status(Ok(TransportResponse::new(500, "second")));

        let handle = ExecutionHandle::new("h").unwrap();
        assert_eq!(api.fetch_status(&handle).await.unwrap().body, "first");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(api.fetch_status(&handle).await.unwrap().status, 500);
        assert!(api.fetch_status(&handle).await.is_err());
        assert_eq!(
            api.status_gaps(),
            vec![Duration::ZERO, Duration::from_secs(3), Duration::ZERO]
        );
    }

    #[tokio::test]
    async fn test_scripted_invoker_keys_by_action() {
        let invoker = ScriptedInvoker::new();
        invoker.push("fetch_changes", Ok(json!({"ok": 1})));
        invoker.push("notify", Ok(json!({"ok": 2})));

        let fetched = invoker
            .invoke(InvocationTarget::Review, json!({"action": "fetch_changes"}))
            .await
            .unwrap();
        assert_eq!(fetched["ok"], 1);
        let notified = invoker
            .invoke(InvocationTarget::Notify, json!({"repository": "r"}))
            .await
            .unwrap();
        assert_eq!(notified["ok"], 2);
        assert!(invoker
            .invoke(InvocationTarget::Review, json!({"action": "post_comments"}))
            .await
            .is_err());
        assert_eq!(invoker.call_count("fetch_changes"), 1);
        assert_eq!(invoker.calls().len(), 3);
    }
}
