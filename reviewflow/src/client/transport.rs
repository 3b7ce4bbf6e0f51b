//! Transport for the trigger and status endpoints.
//!
//! [`ReviewApi`] is the seam between the client logic and HTTP. The trigger
//! client and poll loop only see raw status codes and bodies; envelope
//! unwrapping and classification happen above this layer.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ExecutionHandle;
use crate::errors::Result;

/// Raw response of one endpoint call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl TransportResponse {
    /// Creates a new response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the response has a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The review service's trigger and status endpoints.
///
/// `Err` means the call did not produce a response at all (connection
/// failure, timeout). Non-2xx responses come back as `Ok`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReviewApi: Send + Sync {
    /// `POST /review` with the serialized request.
    async fn start_review(&self, payload: &Value) -> Result<TransportResponse>;

    /// `GET /status/{handle}`.
    async fn fetch_status(&self, handle: &ExecutionHandle) -> Result<TransportResponse>;
}

#[cfg(feature = "http")]
pub use http::HttpReviewApi;

#[cfg(feature = "http")]
mod http {
    use async_trait::async_trait;
    use reqwest::Url;
    use serde_json::Value;
    use tracing::debug;

    use super::{ReviewApi, TransportResponse};
    use crate::config::ApiConfig;
    use crate::core::ExecutionHandle;
    use crate::errors::{Result, ReviewflowError};

    const API_KEY_HEADER: &str = "x-api-key";

    /// [`ReviewApi`] over HTTP using `reqwest`.
    #[derive(Debug, Clone)]
    pub struct HttpReviewApi {
        client: reqwest::Client,
        base_url: Url,
        api_key: String,
    }

    impl HttpReviewApi {
        /// Creates a client for the configured endpoint.
        pub fn new(config: &ApiConfig) -> Result<Self> {
            let base_url = Url::parse(&config.base_url).map_err(|e| {
                ReviewflowError::configuration(format!("invalid api base_url '{}': {e}", config.base_url))
            })?;
            if base_url.cannot_be_a_base() {
                return Err(ReviewflowError::configuration(format!(
                    "api base_url '{}' cannot carry a path",
                    config.base_url
                )));
            }

            let client = reqwest::Client::builder()
                .user_agent(concat!("reviewflow/", env!("CARGO_PKG_VERSION")))
                .timeout(config.request_timeout)
                .build()?;

            Ok(Self {
                client,
                base_url,
                api_key: config.api_key.clone(),
            })
        }

        fn endpoint(&self, segments: &[&str]) -> Url {
            let mut url = self.base_url.clone();
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(segments);
            }
            url
        }

        async fn read(response: reqwest::Response) -> Result<TransportResponse> {
            let status = response.status().as_u16();
            let body = response.text().await?;
            debug!(status, body = %body, "Review API response");
            Ok(TransportResponse { status, body })
        }
    }

    #[async_trait]
    impl ReviewApi for HttpReviewApi {
        async fn start_review(&self, payload: &Value) -> Result<TransportResponse> {
            let response = self
                .client
                .post(self.endpoint(&["review"]))
                .header(API_KEY_HEADER, &self.api_key)
                .json(payload)
                .send()
                .await?;
            Self::read(response).await
        }

        async fn fetch_status(&self, handle: &ExecutionHandle) -> Result<TransportResponse> {
            let response = self
                .client
                .get(self.endpoint(&["status", handle.as_str()]))
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .await?;
            Self::read(response).await
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::time::Duration;

        fn config(base_url: &str) -> ApiConfig {
            ApiConfig {
                base_url: base_url.to_string(),
                api_key: "secret".to_string(),
                request_timeout: Duration::from_secs(5),
            }
        }

        #[test]
        fn test_endpoint_joins_segments() {
            let api = HttpReviewApi::new(&config("https://api.example.com/prod/")).unwrap();
            assert_eq!(
                api.endpoint(&["review"]).as_str(),
                "https://api.example.com/prod/review"
            );
        }

        #[test]
        fn test_endpoint_encodes_handle() {
            let api = HttpReviewApi::new(&config("https://api.example.com/prod")).unwrap();
            let url = api.endpoint(&["status", "arn:aws:states:us-east-1:1:execution:wf/run 1"]);
            assert_eq!(
                url.as_str(),
                "https://api.example.com/prod/status/arn:aws:states:us-east-1:1:execution:wf%2Frun%201"
            );
        }

        #[test]
        fn test_rejects_invalid_base_url() {
            assert!(matches!(
                HttpReviewApi::new(&config("not a url")),
                Err(ReviewflowError::Configuration(_))
            ));
            assert!(HttpReviewApi::new(&config("mailto:ops@example.com")).is_err());
        }
    }
}
