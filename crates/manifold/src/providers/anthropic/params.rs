//! Request construction for the Anthropic messages API.

use manifold_core::{BackendId, GenerateRequest, Result};

use super::convert::to_wire_messages;
use super::tools::{to_wire_tool_choice, to_wire_tools};
use super::wire::{MessagesRequest, SystemBlockParam, ThinkingConfigParam};

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Build the messages-API request for a [`GenerateRequest`].
///
/// Shared by `generate` and `stream` so both paths produce byte-identical
/// payloads before the stream flag is flipped.
pub fn build_messages_request(req: &GenerateRequest) -> Result<MessagesRequest> {
    let messages = to_wire_messages(&req.messages)?;
    let params = &req.params;

    let mut wire = MessagesRequest {
        model: req.model.clone(),
        max_tokens: params.max_tokens_or(DEFAULT_MAX_TOKENS),
        messages,
        system: params
            .system
            .as_ref()
            .map(|text| vec![SystemBlockParam::text(text)]),
        temperature: params.temperature,
        top_p: params.top_p,
        top_k: params.top_k,
        stop_sequences: params.stop.clone(),
        stream: None,
        thinking: None,
        tools: Vec::new(),
        tool_choice: None,
    };

    if params.thinking_enabled() {
        let budget = params.thinking_budget_tokens(BackendId::Anthropic, &req.model)?;
        if budget > 0 {
            wire.thinking = Some(ThinkingConfigParam::enabled(budget));
        }
    }

    if !params.tools.is_empty() {
        wire.tools = to_wire_tools(&params.tools)?;
    }

    if let Some(choice) = &params.tool_choice {
        wire.tool_choice = Some(to_wire_tool_choice(choice)?);
    }

    Ok(wire)
}

/// The exact request payload as a JSON value, for inspection and debugging.
/// Performs no network work.
pub fn build_request_debug(req: &GenerateRequest) -> Result<serde_json::Value> {
    let wire = build_messages_request(req)?;
    Ok(serde_json::to_value(&wire)?)
}
