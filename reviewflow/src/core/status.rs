//! Status check outcomes and pipeline outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Classification of one status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckOutcome {
    /// The pipeline is still running.
    Pending,
    /// The pipeline finished successfully.
    Succeeded,
    /// The pipeline finished with a failure.
    Failed,
    /// The status payload is structurally broken.
    Malformed,
    /// Well-formed payload with an unrecognized status.
    Unknown,
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Malformed => write!(f, "MALFORMED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl CheckOutcome {
    /// Returns true if the outcome ends polling.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Start/stop timestamps reported alongside a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTimes {
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution stopped, if it has.
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Result of classifying one raw status response.
///
/// Produced fresh on every poll and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCheckResult {
    /// Classified outcome.
    pub outcome: CheckOutcome,
    /// Parsed inner body when one was available.
    pub payload: Option<Value>,
    /// Raw transport body.
    pub raw: String,
}

impl StatusCheckResult {
    /// Creates a malformed result for the given raw body.
    #[must_use]
    pub fn malformed(raw: impl Into<String>) -> Self {
        Self {
            outcome: CheckOutcome::Malformed,
            payload: None,
            raw: raw.into(),
        }
    }

    /// The status string reported by the endpoint, if any.
    #[must_use]
    pub fn status_label(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("status"))
            .and_then(Value::as_str)
    }

    /// Start/stop timestamps, when the payload carries a parseable `startDate`.
    #[must_use]
    pub fn execution_times(&self) -> Option<ExecutionTimes> {
        let payload = self.payload.as_ref()?;
        let started_at = parse_timestamp(payload.get("startDate")?)?;
        let stopped_at = payload.get("stopDate").and_then(parse_timestamp);
        Some(ExecutionTimes {
            started_at,
            stopped_at,
        })
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Terminal result of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineResult {
    /// The run completed every stage.
    Succeeded,
    /// The run stopped on a failed stage.
    Failed,
}

impl fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// The single outcome of one execution handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Terminal result.
    pub result: PipelineResult,
    /// Success payload or failure diagnostic.
    pub body: Value,
}

impl PipelineOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn succeeded(body: Value) -> Self {
        Self {
            result: PipelineResult::Succeeded,
            body,
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(body: Value) -> Self {
        Self {
            result: PipelineResult::Failed,
            body,
        }
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result == PipelineResult::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_check_outcome_display() {
        assert_eq!(CheckOutcome::Pending.to_string(), "PENDING");
        assert_eq!(CheckOutcome::Malformed.to_string(), "MALFORMED");
    }

    #[test]
    fn test_check_outcome_is_terminal() {
        assert!(CheckOutcome::Succeeded.is_terminal());
        assert!(CheckOutcome::Failed.is_terminal());
        assert!(!CheckOutcome::Pending.is_terminal());
        assert!(!CheckOutcome::Unknown.is_terminal());
        assert!(!CheckOutcome::Malformed.is_terminal());
    }

    #[test]
    fn test_status_label() {
        let result = StatusCheckResult {
            outcome: CheckOutcome::Unknown,
            payload: Some(json!({"status": "TIMED_OUT"})),
            raw: String::new(),
        };
        assert_eq!(result.status_label(), Some("TIMED_OUT"));
        assert_eq!(StatusCheckResult::malformed("x").status_label(), None);
    }

    #[test]
    fn test_execution_times() {
        let result = StatusCheckResult {
            outcome: CheckOutcome::Succeeded,
            payload: Some(json!({
                "status": "SUCCEEDED",
                "startDate": "2025-05-01T12:00:00.123000+00:00",
                "stopDate": "2025-05-01T12:03:00+00:00",
            })),
            raw: String::new(),
        };
        let times = result.execution_times().unwrap();
        assert_eq!(
            times.stopped_at,
            Some(Utc.with_ymd_and_hms(2025, 5, 1, 12, 3, 0).unwrap())
        );
        assert!(times.started_at < times.stopped_at.unwrap());
    }

    #[test]
    fn test_execution_times_running() {
        let result = StatusCheckResult {
            outcome: CheckOutcome::Pending,
            payload: Some(json!({"status": "RUNNING", "startDate": "2025-05-01T12:00:00+00:00", "stopDate": null})),
            raw: String::new(),
        };
        let times = result.execution_times().unwrap();
        assert_eq!(times.stopped_at, None);
    }

    #[test]
    fn test_pipeline_outcome_serialize() {
        let outcome = PipelineOutcome::succeeded(json!({"result": "ok"}));
        assert!(outcome.is_success());
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"result": "SUCCEEDED", "body": {"result": "ok"}})
        );
        assert!(!PipelineOutcome::failed(json!(null)).is_success());
    }
}
