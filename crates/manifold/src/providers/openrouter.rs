//! OpenRouter backend: an OpenAI-compatible aggregation API that proxies to
//! many upstream model providers.

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
    BackendId, EVENT_CHANNEL_CAPACITY, Error, ErrorCode, EventStream, GenerateRequest,
    GenerateResponse, Provider, Result,
};

use wire::{ApiErrorEnvelope, ChatCompletionRequest, ChatCompletionResponse};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default transport deadline, bounding orphaned sockets.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// [`Provider`] implementation for OpenRouter.
#[derive(Debug, Clone)]
pub struct OpenRouterProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    /// Create a provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::missing_api_key(BackendId::OpenRouter));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn check_model(&self, model: &str) -> Result<()> {
        if self.supports_model(model) {
            return Ok(());
        }
        Err(Error::invalid_model(
            BackendId::OpenRouter,
            model,
            "model not supported by OpenRouter (must be in 'provider/model' format)",
        ))
    }

    /// The backend has no portable server-side search, so requests carrying
    /// the search tool are rejected up front instead of failing at the API.
    fn check_web_search(&self, req: &GenerateRequest) -> Result<()> {
        for tool in &req.params.tools {
            let name = tool.function.name.as_str();
            if name == "search" || name == "web_search" {
                return Err(Error::Tool {
                    code: ErrorCode::UnsupportedTool,
                    tool: name.to_string(),
                    backend: BackendId::OpenRouter,
                    model: req.model.clone(),
                    reason: "web search is not supported on OpenRouter; dispatch search \
                             requests to a backend with a native search tool"
                        .to_string(),
                    retryable: false,
                });
            }
        }
        Ok(())
    }

    async fn post(&self, wire: &ChatCompletionRequest, sse: bool) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if sse {
            request = request.header("Accept", "text/event-stream");
        }
        Ok(request.json(wire).send().await?)
    }

    async fn error_from_response(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(body);
        Error::from_status(BackendId::OpenRouter, status, message)
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    async fn generate(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse> {
        self.check_model(&req.model)?;
        self.check_web_search(req)?;
        let wire = params::build_chat_completion_request(req)?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.post(&wire, false) => response?,
        };

        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }

        let parsed: ChatCompletionResponse = tokio::select! {
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
        self.check_web_search(req)?;
        let mut wire = params::build_chat_completion_request(req)?;
        wire.stream = true;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.post(&wire, true) => response?,
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
        BackendId::OpenRouter
    }

    /// OpenRouter model identifiers use the "provider/model" notation.
    fn supports_model(&self, model: &str) -> bool {
        model.contains('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::{Message, RequestParams, tools::builtin};

    #[test]
    fn test_requires_api_key() {
        assert!(OpenRouterProvider::new("").is_err());
    }

    #[test]
    fn test_supports_model() {
        let provider = OpenRouterProvider::new("sk-or-test").unwrap();
        assert!(provider.supports_model("anthropic/claude-sonnet-4-5"));
        assert!(provider.supports_model("moonshotai/kimi-k2-thinking"));
        assert!(provider.supports_model("openrouter/auto"));
        assert!(!provider.supports_model("claude-sonnet-4-5"));
        assert!(!provider.supports_model("lorem-fast"));
    }

    #[tokio::test]
    async fn test_web_search_tool_rejected() {
        let provider = OpenRouterProvider::new("sk-or-test").unwrap();
        let req = GenerateRequest::new("moonshotai/kimi-k2", vec![Message::user("hi")])
            .with_params(RequestParams {
                tools: vec![builtin::search_tool().unwrap()],
                ..Default::default()
            });
        let err = provider
            .generate(&req, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedTool);
        assert!(err.is_invalid_request());
        assert!(!err.is_retryable());
    }
}
