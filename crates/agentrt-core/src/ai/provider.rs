//! The model provider contract the agent loop samples against.
//!
//! Collapsed from the teacher's streaming `ai::client::streaming::call_streaming`
//! signature to the spec's single-request/single-response contract — no
//! token-level deltas are part of this crate's surface (see NON-GOALS).

use async_trait::async_trait;

use super::types::{ResponsesRequest, ResponsesResponse};
use super::retry::IsRetryable;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("context length exceeded")]
    ContextLengthExceeded,
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Status { status, .. } => super::retry::is_retryable_status(*status),
            ProviderError::ContextLengthExceeded => false,
        }
    }
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn responses_create(
        &self,
        request: ResponsesRequest,
    ) -> Result<ResponsesResponse, ProviderError>;
}

/// A reqwest-backed provider hitting a generic "responses" endpoint,
/// grounded on the teacher's HTTP client usage pattern (one shared client,
/// JSON in/out, status mapped to `ProviderError`) even though the specific
/// wire format is caller-defined — this crate's job stops at the contract.
pub struct HttpModelProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    retry_config: super::retry::RetryConfig,
}

impl HttpModelProvider {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            retry_config: super::retry::RetryConfig::default(),
        }
    }

    async fn call_once(
        &self,
        request: &ResponsesRequest,
    ) -> Result<ResponsesResponse, ProviderError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        response
            .json::<ResponsesResponse>()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    async fn responses_create(
        &self,
        request: ResponsesRequest,
    ) -> Result<ResponsesResponse, ProviderError> {
        super::retry::with_retry(&self.retry_config, || self.call_once(&request)).await
    }
}
