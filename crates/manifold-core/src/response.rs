//! Generation responses.

use serde::{Deserialize, Serialize};

use crate::messages::Block;

/// A complete (non-streaming) generation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Content blocks returned by the backend, sequences 0..n-1.
    pub blocks: Vec<Block>,
    /// Model that served the request; may differ from the requested model if
    /// the backend aliased it.
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Normalized stop reason, e.g. "end_turn", "max_tokens", "tool_use".
    pub stop_reason: String,
    /// Backend-specific extras: stop sequences, cache token counts, response
    /// ids.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub response_metadata: serde_json::Map<String, serde_json::Value>,
}
