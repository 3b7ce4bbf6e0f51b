//! Test fixtures: sample requests and canned transport responses.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use crate::client::TransportResponse;
use crate::core::PipelineRequest;

/// A valid request for `o/r#1`.
#[must_use]
pub fn sample_request() -> PipelineRequest {
    PipelineRequest::new("r", 1, "o")
        .with_branch("feature/review")
        .with_author("octocat")
        .with_title("Add review pipeline")
        .with_state("open")
        .with_created_at(Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).single().unwrap_or_else(Utc::now))
        .with_commit_sha("0123456789abcdef")
}

/// Wraps `body` in a compute-unit envelope with a stringified body.
#[must_use]
pub fn envelope(status_code: u16, body: &Value) -> Value {
    json!({
        "statusCode": status_code,
        "body": body.to_string(),
    })
}

/// A 200 trigger response carrying `execution_arn`.
#[must_use]
pub fn trigger_response(execution_arn: &str) -> TransportResponse {
    let body = json!({"execution_arn": execution_arn, "status": "started"});
    TransportResponse::new(200, envelope(200, &body).to_string())
}

/// A 200 status response whose inner body is `extra` plus `status`.
#[must_use]
pub fn status_response(status: &str, extra: Value) -> TransportResponse {
    let mut body = match extra {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    body.insert("status".to_string(), Value::String(status.to_string()));
    TransportResponse::new(200, envelope(200, &Value::Object(body)).to_string())
}
