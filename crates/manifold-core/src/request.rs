//! Generation requests and the unified parameter bag.

use serde::{Deserialize, Serialize};

use crate::backend::BackendId;
use crate::capabilities;
use crate::error::Result;
use crate::messages::Message;
use crate::tools::{Tool, ToolChoice};

/// Parameters for an LLM generation request.
///
/// All fields are optional so "not set" stays distinct from "set to the zero
/// value"; adapters extract what their backend supports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Randomness, 0.0 = deterministic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Generation stops if any of these sequences are produced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Enables extended thinking on backends that support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_enabled: Option<bool>,
    /// Thinking effort: "low", "medium", or "high".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,
    /// Explicit thinking token budget; overrides `thinking_level`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    /// System prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

impl RequestParams {
    pub fn max_tokens_or(&self, default: u32) -> u32 {
        self.max_tokens.unwrap_or(default)
    }

    pub fn temperature_or(&self, default: f64) -> f64 {
        self.temperature.unwrap_or(default)
    }

    pub fn thinking_enabled(&self) -> bool {
        self.thinking_enabled.unwrap_or(false)
    }

    /// Resolve the thinking token budget for a request.
    ///
    /// An explicit `thinking_budget` wins; otherwise `thinking_level` is
    /// converted through the capability catalog (model-specific table when
    /// present, library defaults otherwise). Returns 0 when neither is set,
    /// which adapters treat as "do not configure thinking".
    pub fn thinking_budget_tokens(&self, backend: BackendId, model: &str) -> Result<u32> {
        if let Some(budget) = self.thinking_budget {
            return Ok(budget);
        }
        match &self.thinking_level {
            Some(level) => capabilities::registry().effort_to_budget(backend.as_str(), model, level),
            None => Ok(0),
        }
    }
}

/// A complete generation request: conversation history, model, parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
    /// Model identifier, e.g. "claude-sonnet-4-5", "moonshotai/kimi-k2",
    /// "lorem-fast".
    pub model: String,
    #[serde(default)]
    pub params: RequestParams,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: model.into(),
            params: RequestParams::default(),
        }
    }

    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = RequestParams::default();
        assert_eq!(params.max_tokens_or(4096), 4096);
        assert_eq!(params.temperature_or(1.0), 1.0);
        assert!(!params.thinking_enabled());
    }

    #[test]
    fn test_explicit_budget_wins() {
        let params = RequestParams {
            thinking_level: Some("high".to_string()),
            thinking_budget: Some(777),
            ..Default::default()
        };
        let budget = params
            .thinking_budget_tokens(BackendId::Lorem, "lorem-fast")
            .unwrap();
        assert_eq!(budget, 777);
    }

    #[test]
    fn test_level_falls_back_to_defaults_for_unknown_model() {
        let params = RequestParams {
            thinking_level: Some("medium".to_string()),
            ..Default::default()
        };
        let budget = params
            .thinking_budget_tokens(BackendId::Lorem, "lorem-unlisted")
            .unwrap();
        assert_eq!(budget, 5000);
    }

    #[test]
    fn test_unset_level_means_no_budget() {
        let params = RequestParams::default();
        let budget = params
            .thinking_budget_tokens(BackendId::Anthropic, "claude-sonnet-4-5")
            .unwrap();
        assert_eq!(budget, 0);
    }

    #[test]
    fn test_unknown_level_errors() {
        let params = RequestParams {
            thinking_level: Some("extreme".to_string()),
            ..Default::default()
        };
        assert!(
            params
                .thinking_budget_tokens(BackendId::Lorem, "lorem-fast")
                .is_err()
        );
    }
}
