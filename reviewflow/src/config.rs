//! Configuration for the review client and the stage orchestrator.
//!
//! Every field has a serde default, so a partial JSON file (or none at all)
//! yields a usable configuration. Durations are written as seconds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::client::{PollPolicy, TriggerPolicy};
use crate::errors::{Result, ReviewflowError};

/// Environment variable holding the API base URL.
pub const ENV_API_URL: &str = "REVIEWFLOW_API_URL";
/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "REVIEWFLOW_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewflowConfig {
    /// Review service endpoint.
    #[serde(default)]
    pub api: ApiConfig,
    /// Trigger retry policy.
    #[serde(default)]
    pub trigger: TriggerPolicy,
    /// Poll loop policy.
    #[serde(default)]
    pub poll: PollPolicy,
    /// Local stage orchestration settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl ReviewflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            ReviewflowError::configuration(format!("{}: {e}", path.display()))
        })
    }

    /// Applies `REVIEWFLOW_API_URL` / `REVIEWFLOW_API_KEY` from the process
    /// environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api.base_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.api.api_key = key;
        }
        self
    }

    /// Checks the settings needed to talk to the review service.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(ReviewflowError::configuration(format!(
                "api.base_url is not set (use --api-url or {ENV_API_URL})"
            )));
        }
        self.trigger.validate()?;
        self.poll.validate()?;
        Ok(())
    }
}

/// Review service endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://abc.execute-api.us-east-1.amazonaws.com/prod`.
    #[serde(default)]
    pub base_url: String,
    /// Value sent in the `x-api-key` header.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Per-request transport timeout.
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl ApiConfig {
    /// Creates an endpoint configuration.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Settings for running the stage chain locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Endpoint of the review compute unit (`fetch_changes`, ...).
    #[serde(default)]
    pub review_function_url: Option<String>,
    /// Endpoint of the notification compute unit.
    #[serde(default)]
    pub notify_function_url: Option<String>,
    /// Send a notification when the chain fails.
    #[serde(default)]
    pub notify_on_failure: bool,
    /// Transport timeout for one invocation.
    #[serde(default = "default_invocation_timeout", with = "duration_secs")]
    pub invocation_timeout: Duration,
}

fn default_invocation_timeout() -> Duration {
    Duration::from_secs(600)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            review_function_url: None,
            notify_function_url: None,
            notify_on_failure: false,
            invocation_timeout: default_invocation_timeout(),
        }
    }
}

/// Serde helpers writing a [`Duration`] as fractional seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
