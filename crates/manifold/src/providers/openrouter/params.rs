//! Request construction for OpenRouter chat completions.

use manifold_core::{GenerateRequest, Result};

use super::convert::to_wire_messages;
use super::tools::{to_wire_tool_choice, to_wire_tools};
use super::wire::{ChatCompletionRequest, WireMessage};

/// Build the chat-completion request for a [`GenerateRequest`].
///
/// Shared by `generate` and `stream`; only the stream flag differs between
/// the two paths.
pub fn build_chat_completion_request(req: &GenerateRequest) -> Result<ChatCompletionRequest> {
    let mut messages = to_wire_messages(&req.messages)?;
    let params = &req.params;

    // The system prompt is an ordinary leading message here, unlike the
    // separate system parameter of the Anthropic API.
    if let Some(system) = &params.system {
        messages.insert(
            0,
            WireMessage {
                role: "system".to_string(),
                content: Some(serde_json::json!(system)),
                ..Default::default()
            },
        );
    }

    let mut wire = ChatCompletionRequest {
        model: req.model.clone(),
        messages,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        top_p: params.top_p,
        top_k: params.top_k,
        stop: params.stop.clone(),
        seed: params.seed,
        frequency_penalty: params.frequency_penalty,
        presence_penalty: params.presence_penalty,
        stream: false,
        tools: Vec::new(),
        tool_choice: None,
        parallel_tool_calls: params.parallel_tool_calls,
    };

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
    let wire = build_chat_completion_request(req)?;
    Ok(serde_json::to_value(&wire)?)
}
