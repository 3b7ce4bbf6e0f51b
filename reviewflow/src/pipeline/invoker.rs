//! Invocation contract of the remote compute units.

use async_trait::async_trait;
use serde_json::Value;

use super::definition::InvocationTarget;
use crate::errors::InvocationError;

/// Invokes a remote compute unit.
///
/// Returns the unit's raw envelope (`{"statusCode": .., "body": ".."}`).
/// Failures are classified so retry policies can tell transient
/// infrastructure errors from task failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StageInvoker: Send + Sync {
    /// Sends `payload` to `target`.
    async fn invoke(&self, target: InvocationTarget, payload: Value) -> Result<Value, InvocationError>;
}

#[cfg(feature = "http")]
pub use http::HttpStageInvoker;

#[cfg(feature = "http")]
mod http {
    use async_trait::async_trait;
    use reqwest::{StatusCode, Url};
    use serde_json::Value;
    use tracing::debug;

    use super::StageInvoker;
    use crate::config::PipelineConfig;
    use crate::errors::{ErrorClass, InvocationError, Result, ReviewflowError};
    use crate::pipeline::definition::InvocationTarget;

    /// [`StageInvoker`] posting JSON to HTTP endpoints.
    #[derive(Debug, Clone)]
    pub struct HttpStageInvoker {
        client: reqwest::Client,
        review_url: Url,
        notify_url: Url,
    }

    impl HttpStageInvoker {
        /// Creates an invoker for the configured endpoints.
        pub fn new(config: &PipelineConfig) -> Result<Self> {
            let review_url = parse_endpoint("pipeline.review_function_url", config.review_function_url.as_deref())?;
            let notify_url = parse_endpoint("pipeline.notify_function_url", config.notify_function_url.as_deref())?;
            let client = reqwest::Client::builder()
                .user_agent(concat!("reviewflow/", env!("CARGO_PKG_VERSION")))
                .timeout(config.invocation_timeout)
                .build()?;
            Ok(Self {
                client,
                review_url,
                notify_url,
            })
        }

        fn url(&self, target: InvocationTarget) -> &Url {
            match target {
                InvocationTarget::Review => &self.review_url,
                InvocationTarget::Notify => &self.notify_url,
            }
        }
    }

    fn parse_endpoint(field: &str, value: Option<&str>) -> Result<Url> {
        let raw = value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ReviewflowError::configuration(format!("{field} is not set")))?;
        Url::parse(raw).map_err(|e| ReviewflowError::configuration(format!("invalid {field} '{raw}': {e}")))
    }

    fn classify_transport(err: &reqwest::Error) -> InvocationError {
        if err.is_timeout() {
            InvocationError::timeout(err.to_string())
        } else {
            InvocationError::service(err.to_string())
        }
    }

    fn classify_status(status: StatusCode, body: &str) -> Option<InvocationError> {
        if status.is_success() {
            return None;
        }
        let message = format!("HTTP {}: {body}", status.as_u16());
        Some(if status == StatusCode::TOO_MANY_REQUESTS {
            InvocationError::throttled(message)
        } else if status.is_server_error() {
            InvocationError::service(message)
        } else {
            InvocationError::task_failed(message)
        })
    }

    #[async_trait]
    impl StageInvoker for HttpStageInvoker {
        async fn invoke(&self, target: InvocationTarget, payload: Value) -> std::result::Result<Value, InvocationError> {
            let response = self
                .client
                .post(self.url(target).clone())
                .json(&payload)
                .send()
                .await
                .map_err(|e| classify_transport(&e))?;
            let status = response.status();
            let body = response.text().await.map_err(|e| classify_transport(&e))?;
            debug!(?target, status = status.as_u16(), body = %body, "Stage invocation response");

            if let Some(err) = classify_status(status, &body) {
                return Err(err);
            }
            serde_json::from_str(&body)
                .map_err(|e| InvocationError::new(ErrorClass::MalformedOutput, format!("response is not JSON: {e}")))
        }
    }

}
