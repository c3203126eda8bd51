//! Anthropic (Claude) backend.

mod convert;
mod params;
mod streaming;
mod tools;
mod wire;

pub use params::build_request_debug;

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use manifold_core::{
    BackendId, EVENT_CHANNEL_CAPACITY, Error, EventStream, GenerateRequest, GenerateResponse,
    Provider, Result,
};

use wire::{ApiErrorEnvelope, MessagesRequest, MessagesResponse};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Default transport deadline, bounding orphaned sockets.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// [`Provider`] implementation for Anthropic's messages API.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    api_key: String,
    api_base: String,
    api_version: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::missing_api_key(BackendId::Anthropic));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            client,
        })
    }

    /// Override the API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Override the `anthropic-version` header.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn check_model(&self, model: &str) -> Result<()> {
        if self.supports_model(model) {
            return Ok(());
        }
        Err(Error::invalid_model(
            BackendId::Anthropic,
            model,
            "model not supported by Anthropic (must start with 'claude-')",
        ))
    }

    async fn post(&self, wire: &MessagesRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .header("content-type", "application/json")
            .json(wire)
            .send()
            .await?;
        Ok(response)
    }

    async fn error_from_response(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(body);
        Error::from_status(BackendId::Anthropic, status, message)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn generate(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse> {
        self.check_model(&req.model)?;
        let wire = params::build_messages_request(req)?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.post(&wire) => response?,
        };

        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }

        let parsed: MessagesResponse = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            parsed = response.json() => parsed?,
        };
        convert::response_from_wire(parsed)
    }

    async fn stream(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream> {
        self.check_model(&req.model)?;
        let mut wire = params::build_messages_request(req)?;
        wire.stream = Some(true);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.post(&wire) => response?,
        };

        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let upstream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from)),
        );
        tokio::spawn(streaming::run_stream(upstream, tx, cancel));

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> BackendId {
        BackendId::Anthropic
    }

    /// Anthropic model identifiers start with "claude-".
    fn supports_model(&self, model: &str) -> bool {
        model.starts_with("claude-")
    }
}
