//! Conversion between the normalized conversation model and OpenRouter's
//! OpenAI-compatible format, in both directions.
//!
//! Response decomposition is split into three independent extracts — web
//! search annotations, reasoning details, content text — feeding a small
//! state machine that decides block transitions. The same functions back the
//! streaming and non-streaming paths.

use serde_json::json;
use tracing::debug;

use manifold_core::{
    BackendId, Block, BlockKind, Citation, Error, ExecutionSide, GenerateResponse, Message,
    Result, Role, SearchResult, normalize_stop_reason, split_messages_at_cross_backend_tool,
};

use super::wire::{
    Annotation, ChatCompletionResponse, FunctionCall, ReasoningDetail, ToolCall, WireMessage,
};

// ===== Parsed extracts =====

/// Structured information extracted from one delta or message.
pub struct ParsedDelta {
    pub web_search: Option<Vec<Annotation>>,
    pub thinking: Option<ThinkingInfo>,
    pub text: Option<String>,
}

/// Reasoning text plus the original structured details for replay.
pub struct ThinkingInfo {
    pub text: String,
    pub original: Vec<ReasoningDetail>,
}

/// Decompose annotations, reasoning details, and content into extracts.
/// Pure extraction; no state, no emission.
pub fn parse_delta(
    annotations: &[Annotation],
    reasoning_details: &[ReasoningDetail],
    content: Option<&str>,
) -> ParsedDelta {
    let web_search = (!annotations.is_empty()).then(|| annotations.to_vec());

    let thinking = {
        let mut text = String::new();
        for detail in reasoning_details {
            match detail.kind.as_str() {
                "reasoning.text" => {
                    if let Some(t) = &detail.text {
                        text.push_str(t);
                    }
                }
                "reasoning.summary" => {
                    if let Some(s) = &detail.summary {
                        text.push_str(s);
                    }
                }
                // reasoning.encrypted carries nothing usable locally.
                _ => {}
            }
        }
        (!text.is_empty()).then(|| ThinkingInfo {
            text,
            original: reasoning_details.to_vec(),
        })
    };

    let text = content.filter(|c| !c.is_empty()).map(|c| c.to_string());

    ParsedDelta {
        web_search,
        thinking,
        text,
    }
}

// ===== Block state machine =====

/// Current block-assembly state while walking a response or stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockState {
    /// Kind of the block being assembled; `None` before the first block.
    pub current_kind: Option<BlockKind>,
    pub current_index: usize,
    /// Web search blocks are emitted at most once per response.
    pub web_search_done: bool,
}

/// What to do with the current block given a new extract.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockTransition {
    pub close_previous: bool,
    pub start_new: Option<BlockKind>,
    pub new_index: usize,
}

/// Decide block transitions from the current state and a parsed extract.
/// Pure decision; no emission.
pub fn determine_transition(state: BlockState, parsed: &ParsedDelta) -> BlockTransition {
    let mut transition = BlockTransition {
        new_index: state.current_index,
        ..Default::default()
    };

    // Thinking finished, text beginning.
    if state.current_kind == Some(BlockKind::Thinking)
        && parsed.text.is_some()
        && parsed.thinking.is_none()
    {
        transition.close_previous = true;
        transition.start_new = Some(BlockKind::Text);
        transition.new_index = state.current_index + 1;
        return transition;
    }

    if parsed.thinking.is_some() && state.current_kind != Some(BlockKind::Thinking) {
        transition.start_new = Some(BlockKind::Thinking);
        return transition;
    }

    if parsed.text.is_some() && state.current_kind != Some(BlockKind::Text) {
        transition.start_new = Some(BlockKind::Text);
        return transition;
    }

    transition
}

// ===== Web search synthesis =====

/// Synthesize a web_search_use/web_search_result block pair from citation
/// annotations. Models with search enabled invoke it implicitly, so the
/// invocation is reconstructed here.
pub fn annotations_to_web_search_blocks(
    annotations: &[Annotation],
    start_sequence: usize,
    tool_use_id: &str,
) -> Vec<Block> {
    if annotations.is_empty() {
        return Vec::new();
    }

    let use_block = Block::web_search_use_with_input(
        tool_use_id,
        "web_search",
        json!({ "query": "(auto-invoked web search)" }),
    )
    .with_sequence(start_sequence)
    .with_execution_side(ExecutionSide::Provider)
    .with_source_backend(BackendId::OpenRouter);

    let results: Vec<SearchResult> = annotations
        .iter()
        .filter_map(|a| a.url_citation.as_ref())
        .map(|cite| SearchResult {
            url: cite.url.clone(),
            title: cite.title.clone(),
            content: cite.content.clone(),
            page_age: None,
        })
        .collect();

    let result_block = Block::web_search_result(tool_use_id, results)
        .with_sequence(start_sequence + 1)
        .with_source_backend(BackendId::OpenRouter);

    vec![use_block, result_block]
}

pub fn annotations_to_citations(annotations: &[Annotation]) -> Vec<Citation> {
    annotations
        .iter()
        .filter_map(|a| a.url_citation.as_ref())
        .map(|cite| Citation {
            kind: "url_citation".to_string(),
            url: cite.url.clone(),
            title: cite.title.clone().unwrap_or_default(),
            start_index: Some(cite.start_index),
            end_index: Some(cite.end_index),
            cited_text: cite.content.clone(),
            result_index: None,
            provider_data: None,
        })
        .collect()
}

// ===== Thinking replay =====

/// Convert a thinking block to its reasoning_details array.
///
/// Blocks this backend produced replay their original structured details
/// from provider data; anything else synthesizes a plain reasoning.text
/// entry from the normalized text.
pub fn thinking_to_reasoning_details(block: &Block) -> Vec<ReasoningDetail> {
    if block.is_from_backend(BackendId::OpenRouter) && block.has_provider_data() {
        if let Some(data) = &block.provider_data {
            match serde_json::from_value::<Vec<ReasoningDetail>>(data.clone()) {
                Ok(details) => return details,
                Err(err) => {
                    debug!(%err, "thinking replay failed; synthesizing reasoning.text");
                }
            }
        }
    }

    match block.text_content() {
        Some(text) if !text.is_empty() => vec![ReasoningDetail::text(text)],
        _ => Vec::new(),
    }
}

// ===== Message translation =====

/// Wire-level role used during splitting; the normalized model has no "tool"
/// role, but this backend requires one for tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnRole {
    User,
    Assistant,
    Tool,
}

struct Turn {
    role: TurnRole,
    blocks: Vec<Block>,
}

/// Split assistant messages at tool_result boundaries. The tool_result turn
/// keeps a dedicated role so the merge step cannot fold it back into the
/// surrounding assistant turns.
fn split_at_tool_results(messages: Vec<Message>) -> Vec<Turn> {
    let mut result = Vec::with_capacity(messages.len());

    for msg in messages {
        if msg.role != Role::Assistant {
            result.push(Turn {
                role: TurnRole::User,
                blocks: msg.blocks,
            });
            continue;
        }

        let mut current: Vec<Block> = Vec::new();
        for block in msg.blocks {
            if block.is_tool_result() {
                if !current.is_empty() {
                    result.push(Turn {
                        role: TurnRole::Assistant,
                        blocks: std::mem::take(&mut current),
                    });
                }
                result.push(Turn {
                    role: TurnRole::Tool,
                    blocks: vec![block],
                });
            } else {
                current.push(block);
            }
        }
        if !current.is_empty() {
            result.push(Turn {
                role: TurnRole::Assistant,
                blocks: current,
            });
        }
    }

    result
}

fn merge_consecutive_same_role(turns: Vec<Turn>) -> Vec<Turn> {
    let mut iter = turns.into_iter();
    let Some(mut current) = iter.next() else {
        return Vec::new();
    };

    let mut merged = Vec::new();
    for turn in iter {
        if turn.role == current.role && turn.role != TurnRole::Tool {
            current.blocks.extend(turn.blocks);
        } else {
            merged.push(current);
            current = turn;
        }
    }
    merged.push(current);
    merged
}

/// Translate normalized messages into chat-completion messages.
pub fn to_wire_messages(messages: &[Message]) -> Result<Vec<WireMessage>> {
    let processed =
        split_messages_at_cross_backend_tool(messages.to_vec(), BackendId::OpenRouter);
    let split = split_at_tool_results(processed);
    let merged = merge_consecutive_same_role(split);

    let mut result = Vec::with_capacity(merged.len());
    for (i, turn) in merged.into_iter().enumerate() {
        result.extend(convert_turn(turn, i)?);
    }
    Ok(result)
}

/// Convert one turn; tool turns may expand into several role:"tool"
/// messages.
fn convert_turn(turn: Turn, turn_index: usize) -> Result<Vec<WireMessage>> {
    let mut result = Vec::new();

    let mut text_parts: Vec<&str> = Vec::new();
    let mut reasoning_details: Vec<ReasoningDetail> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for (j, block) in turn.blocks.iter().enumerate() {
        match block.kind() {
            BlockKind::ToolResult => {
                result.push(tool_result_message(block, turn_index, j)?);
            }
            BlockKind::Text => {
                if let Some(text) = block.text_content() {
                    text_parts.push(text);
                }
            }
            BlockKind::Thinking => {
                // Preserve the structured form; flattening thinking into text
                // breaks reasoning replay for tool continuation.
                reasoning_details.extend(thinking_to_reasoning_details(block));
            }
            BlockKind::ToolUse => {
                if turn.role == TurnRole::Assistant {
                    tool_calls.push(tool_use_to_tool_call(block, turn_index, j)?);
                }
            }
            // Web search blocks are backend-specific; their splitter rewrite
            // already happened, and same-backend replay travels via
            // reasoning/annotations on the original turn.
            _ => {}
        }
    }

    let role = match turn.role {
        TurnRole::User => "user",
        TurnRole::Assistant => "assistant",
        TurnRole::Tool => return Ok(result),
    };

    let mut msg = WireMessage {
        role: role.to_string(),
        ..Default::default()
    };
    if !text_parts.is_empty() {
        msg.content = Some(json!(text_parts.join("\n\n")));
    }
    if !reasoning_details.is_empty() {
        msg.reasoning_details = reasoning_details;
    }
    if !tool_calls.is_empty() {
        msg.tool_calls = tool_calls;
    }

    if msg.content.is_some() || !msg.tool_calls.is_empty() || !msg.reasoning_details.is_empty() {
        result.push(msg);
    }

    Ok(result)
}

fn tool_result_message(block: &Block, turn_index: usize, block_index: usize) -> Result<WireMessage> {
    let tool_use_id = block.tool_use_id().unwrap_or_default();
    if tool_use_id.is_empty() {
        return Err(Error::invalid_request(
            format!("messages[{turn_index}].blocks[{block_index}].tool_use_id"),
            "tool_result block missing tool_use_id",
        ));
    }

    let content = match &block.data {
        manifold_core::BlockData::ToolResult {
            is_error,
            content,
            result,
            error,
            ..
        } => content
            .clone()
            .or_else(|| if *is_error { None } else { result.clone() })
            .or_else(|| error.clone())
            .unwrap_or_default(),
        _ => String::new(),
    };

    Ok(WireMessage {
        role: "tool".to_string(),
        content: Some(json!(content)),
        tool_call_id: Some(tool_use_id.to_string()),
        ..Default::default()
    })
}

fn tool_use_to_tool_call(block: &Block, turn_index: usize, block_index: usize) -> Result<ToolCall> {
    let field = |name: &str| format!("messages[{turn_index}].blocks[{block_index}].{name}");

    let id = block.tool_use_id().unwrap_or_default();
    if id.is_empty() {
        return Err(Error::invalid_request(
            field("tool_use_id"),
            "tool_use block missing tool_use_id",
        ));
    }
    let name = block.tool_name().unwrap_or_default();
    if name.is_empty() {
        return Err(Error::invalid_request(
            field("tool_name"),
            "tool_use block missing tool_name",
        ));
    }
    let input = block
        .tool_input()
        .ok_or_else(|| Error::invalid_request(field("input"), "tool_use block missing input"))?;

    Ok(ToolCall {
        index: None,
        id: id.to_string(),
        kind: "function".to_string(),
        function: FunctionCall {
            name: name.to_string(),
            arguments: serde_json::to_string(input)?,
        },
    })
}

// ===== Response translation =====

/// Build complete blocks from one parsed (non-streaming) message.
pub fn build_blocks(parsed: &ParsedDelta, state: &mut BlockState, search_id: &str) -> Vec<Block> {
    let mut blocks = Vec::new();

    if let Some(annotations) = &parsed.web_search {
        if !state.web_search_done {
            let ws = annotations_to_web_search_blocks(annotations, state.current_index, search_id);
            state.current_index += ws.len();
            state.web_search_done = true;
            blocks.extend(ws);
        }
    }

    if let Some(thinking) = &parsed.thinking {
        let mut block = Block::thinking(thinking.text.clone())
            .with_sequence(state.current_index)
            .with_source_backend(BackendId::OpenRouter);
        if !thinking.original.is_empty() {
            if let Ok(data) = serde_json::to_value(&thinking.original) {
                block = block.with_provider_data(data);
            }
        }
        blocks.push(block);
        state.current_index += 1;
        state.current_kind = Some(BlockKind::Thinking);
    }

    if let Some(text) = &parsed.text {
        blocks.push(
            Block::text(text.clone())
                .with_sequence(state.current_index)
                .with_source_backend(BackendId::OpenRouter),
        );
        state.current_index += 1;
        state.current_kind = Some(BlockKind::Text);
    }

    blocks
}

/// Convert a complete chat-completion response to the library shape.
pub fn response_from_wire(resp: ChatCompletionResponse) -> Result<GenerateResponse> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::invalid_request("choices", "no choices in response"))?;

    let mut state = BlockState::default();
    let parsed = parse_delta(
        &choice.message.annotations,
        &choice.message.reasoning_details,
        choice.message.content_text(),
    );

    let mut blocks = build_blocks(&parsed, &mut state, "or_websearch_0");

    // Citations ride on the first text block.
    if parsed.web_search.is_some() {
        let citations = annotations_to_citations(&choice.message.annotations);
        if let Some(text_block) = blocks.iter_mut().find(|b| b.kind() == BlockKind::Text) {
            text_block.citations = citations;
        }
    }

    for tool_call in &choice.message.tool_calls {
        match tool_call_to_block(tool_call, state.current_index) {
            Ok(block) => {
                blocks.push(block);
                state.current_index += 1;
            }
            Err(err) => {
                debug!(%err, "skipping malformed tool call in response");
            }
        }
    }

    let stop_reason = choice
        .finish_reason
        .as_deref()
        .map(normalize_stop_reason)
        .unwrap_or_default();

    let mut response_metadata = serde_json::Map::new();
    response_metadata.insert("total_tokens".to_string(), json!(resp.usage.total_tokens));
    response_metadata.insert("response_id".to_string(), json!(resp.id));

    Ok(GenerateResponse {
        blocks,
        model: resp.model,
        input_tokens: resp.usage.prompt_tokens,
        output_tokens: resp.usage.completion_tokens,
        stop_reason,
        response_metadata,
    })
}

/// Convert one complete tool call to a tool_use block.
pub fn tool_call_to_block(tool_call: &ToolCall, sequence: usize) -> Result<Block> {
    let input: serde_json::Value = if tool_call.function.arguments.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&tool_call.function.arguments).map_err(|err| {
            Error::invalid_value(
                format!("tool_calls.{}", tool_call.id),
                tool_call.function.arguments.clone(),
                format!("invalid tool call arguments: {err}"),
            )
        })?
    };

    Ok(Block::tool_use(
        tool_call.id.clone(),
        tool_call.function.name.clone(),
        input,
    )
    .with_sequence(sequence)
    .with_execution_side(ExecutionSide::Server)
    .with_source_backend(BackendId::OpenRouter))
}
