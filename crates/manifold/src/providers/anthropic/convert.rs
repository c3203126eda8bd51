//! Conversion between the normalized conversation model and the Anthropic
//! messages API, in both directions.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

use manifold_core::{
    BackendId, Block, BlockData, BlockKind, Citation, Error, ExecutionSide, GenerateResponse,
    Message, Result, Role, split_messages_at_cross_backend_tool,
};

use super::wire::{ContentParam, MessageParam, MessagesResponse, WireCitation};

/// Tool-use IDs must match `^[a-zA-Z0-9_-]+$`. Other backends generate IDs
/// with spaces, periods, or colons; invalid characters become underscores in
/// the tool_use *and* every referencing tool_result so the pair survives.
pub fn sanitize_tool_use_id(id: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("valid pattern"));
    invalid.replace_all(id, "_").into_owned()
}

/// Translate normalized messages into Anthropic message params.
///
/// Pipeline: cross-backend splitter, tool-result boundary split,
/// consecutive-same-role merge, per-block rendering.
pub fn to_wire_messages(messages: &[Message]) -> Result<Vec<MessageParam>> {
    let processed =
        split_messages_at_cross_backend_tool(messages.to_vec(), BackendId::Anthropic);
    let split = split_at_tool_results(processed);
    let merged = merge_consecutive_same_role(split);

    let mut result = Vec::with_capacity(merged.len());
    for (i, msg) in merged.iter().enumerate() {
        let mut blocks = Vec::with_capacity(msg.blocks.len());
        for (j, block) in msg.blocks.iter().enumerate() {
            if let Some(rendered) = render_block(block, i, j)? {
                blocks.push(rendered);
            }
        }
        result.push(MessageParam {
            role: msg.role.as_str(),
            content: blocks,
        });
    }
    Ok(result)
}

/// Split assistant messages at each tool_result boundary so turns alternate
/// the way the API requires.
///
/// `[assistant: thinking, text, tool_use, tool_result, thinking, tool_use,
/// tool_result]` becomes `[assistant: thinking, text, tool_use]`,
/// `[user: tool_result]`, `[assistant: thinking, tool_use]`,
/// `[user: tool_result]`. Each tool_use must be immediately followed by a
/// user message carrying its tool_result.
pub fn split_at_tool_results(messages: Vec<Message>) -> Vec<Message> {
    let mut result = Vec::with_capacity(messages.len());

    for msg in messages {
        if msg.role != Role::Assistant {
            result.push(msg);
            continue;
        }

        let mut current: Vec<Block> = Vec::new();
        for block in msg.blocks {
            if block.is_tool_result() {
                if !current.is_empty() {
                    result.push(
                        Message::new(Role::Assistant, std::mem::take(&mut current)).resequence(),
                    );
                }
                result.push(Message::new(Role::User, vec![block]).resequence());
            } else {
                current.push(block);
            }
        }
        if !current.is_empty() {
            result.push(Message::new(Role::Assistant, current).resequence());
        }
    }

    result
}

/// Merge adjacent messages that share a role, concatenating their blocks.
///
/// After splitting, a fresh user turn following a tool_result leaves two
/// consecutive user messages that must merge for proper alternation.
pub fn merge_consecutive_same_role(messages: Vec<Message>) -> Vec<Message> {
    let mut iter = messages.into_iter();
    let Some(mut current) = iter.next() else {
        return Vec::new();
    };

    let mut merged = Vec::new();
    for msg in iter {
        if msg.role == current.role {
            current.blocks.extend(msg.blocks);
        } else {
            merged.push(current.resequence());
            current = msg;
        }
    }
    merged.push(current.resequence());
    merged
}

/// Render one block to its wire form. `Ok(None)` means the block kind has no
/// Anthropic rendering and was skipped with a diagnostic.
fn render_block(block: &Block, msg_index: usize, block_index: usize) -> Result<Option<ContentParam>> {
    // Same-backend replay: reconstruct the exact original block so encrypted
    // content and signatures survive round trips.
    if block.is_from_backend(BackendId::Anthropic) && block.has_provider_data() {
        match replay_block(block) {
            Ok(replayed) => return Ok(Some(replayed)),
            Err(err) => {
                if matches!(
                    block.kind(),
                    BlockKind::WebSearchUse | BlockKind::WebSearchResult
                ) {
                    return Err(Error::invalid_request(
                        format!("messages[{msg_index}].blocks[{block_index}]"),
                        format!("failed to replay web_search block: {err}"),
                    ));
                }
                debug!(%err, "provider data replay failed; falling back to normalized rendering");
            }
        }
    }

    // A provider-side tool from another backend here means the splitter
    // missed it.
    if block.is_provider_side_tool() && block.is_from_different_backend(BackendId::Anthropic) {
        return Err(Error::internal(format!(
            "message {msg_index}, block {block_index}: unexpected cross-backend provider-side tool (should have been split)"
        )));
    }

    let field = |name: &str| format!("messages[{msg_index}].blocks[{block_index}].{name}");

    match &block.data {
        BlockData::Text { text } => Ok(Some(ContentParam::Text { text: text.clone() })),

        BlockData::ToolUse {
            tool_use_id,
            tool_name,
            input,
        } => {
            if tool_use_id.is_empty() {
                return Err(Error::invalid_request(
                    field("tool_use_id"),
                    "tool_use block missing tool_use_id",
                ));
            }
            if tool_name.is_empty() {
                return Err(Error::invalid_request(
                    field("tool_name"),
                    "tool_use block missing tool_name",
                ));
            }
            Ok(Some(ContentParam::ToolUse {
                id: sanitize_tool_use_id(tool_use_id),
                name: tool_name.clone(),
                input: input.clone(),
            }))
        }

        BlockData::ToolResult {
            tool_use_id,
            is_error,
            content,
            result,
            error,
        } => {
            if tool_use_id.is_empty() {
                return Err(Error::invalid_request(
                    field("tool_use_id"),
                    "tool_result block missing tool_use_id",
                ));
            }
            // Result content priority: content, then result for successes,
            // then the error message for failures.
            let text = content
                .clone()
                .or_else(|| if *is_error { None } else { result.clone() })
                .or_else(|| if *is_error { error.clone() } else { None })
                .unwrap_or_default();
            Ok(Some(ContentParam::ToolResult {
                tool_use_id: sanitize_tool_use_id(tool_use_id),
                content: text,
                is_error: *is_error,
            }))
        }

        BlockData::Thinking { text } => {
            let signature = block
                .provider_data
                .as_ref()
                .and_then(|pd| pd.get("signature"))
                .and_then(|s| s.as_str())
                .unwrap_or_default();

            // Thinking imported from another backend has no cryptographic
            // signature, and the API rejects unsigned thinking blocks.
            // Preserve the semantics as tagged text instead.
            if signature.is_empty() {
                return Ok(Some(ContentParam::Text {
                    text: format!("<thinking>\n{text}\n</thinking>"),
                }));
            }
            Ok(Some(ContentParam::Thinking {
                thinking: text.clone(),
                signature: signature.to_string(),
            }))
        }

        BlockData::WebSearchUse { .. } | BlockData::WebSearchResult { .. } => {
            // Same-backend replay was attempted above; anything reaching this
            // point is a cross-backend web search exchange.
            Err(Error::invalid_request(
                field("kind"),
                "cross-backend web_search replay is not supported",
            ))
        }

        BlockData::Image { .. } | BlockData::Document { .. } => {
            warn!(kind = ?block.kind(), "skipping block kind with no Anthropic rendering");
            Ok(None)
        }
    }
}

/// Rebuild the exact original wire block from preserved provider data.
fn replay_block(block: &Block) -> Result<ContentParam> {
    let data = block
        .provider_data
        .as_ref()
        .ok_or_else(|| Error::internal("replay without provider data"))?;

    match data.get("type").and_then(|t| t.as_str()) {
        Some("server_tool_use") => {
            let id = data
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::invalid_request("provider_data.id", "missing id"))?;
            let name = data
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::invalid_request("provider_data.name", "missing name"))?;
            Ok(ContentParam::ServerToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: data.get("input").cloned().unwrap_or(json!({})),
            })
        }

        Some("web_search_tool_result") => {
            let tool_use_id = data
                .get("tool_use_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    Error::invalid_request("provider_data.tool_use_id", "missing tool_use_id")
                })?;
            let content = data.get("content").unwrap_or(&serde_json::Value::Null);

            if let Some(results) = content.get("results").and_then(|r| r.as_array()) {
                if !results.is_empty() {
                    return Ok(ContentParam::WebSearchToolResult {
                        tool_use_id: tool_use_id.to_string(),
                        content: serde_json::Value::Array(results.clone()),
                    });
                }
            }
            if let Some(error_code) = content.get("error_code").and_then(|c| c.as_str()) {
                return Ok(ContentParam::WebSearchToolResult {
                    tool_use_id: tool_use_id.to_string(),
                    content: json!({
                        "type": "web_search_tool_result_error",
                        "error_code": error_code,
                    }),
                });
            }
            Err(Error::invalid_request(
                "provider_data.content",
                "web_search_tool_result has no results and no error",
            ))
        }

        other => Err(Error::invalid_request(
            "provider_data.type",
            format!("raw replay not implemented for type: {}", other.unwrap_or("<none>")),
        )),
    }
}

/// Convert one incoming content block to a normalized [`Block`].
///
/// Backend-specific shapes (`server_tool_use`, `web_search_tool_result`)
/// normalize to the library's web-search kinds while the raw wire form is
/// kept in `provider_data` for replay. `Ok(None)` means an unknown block type
/// was skipped with a diagnostic.
pub fn block_from_wire(value: &serde_json::Value, sequence: usize) -> Result<Option<Block>> {
    let kind = value.get("type").and_then(|t| t.as_str()).unwrap_or("");

    match kind {
        "text" => {
            let text = value.get("text").and_then(|t| t.as_str()).unwrap_or("");
            let mut block = Block::text(text)
                .with_sequence(sequence)
                .with_source_backend(BackendId::Anthropic);

            if let Some(raw_citations) = value.get("citations").and_then(|c| c.as_array()) {
                let citations: Vec<Citation> = raw_citations
                    .iter()
                    .filter_map(|raw| {
                        serde_json::from_value::<WireCitation>(raw.clone())
                            .ok()
                            .map(citation_from_wire)
                    })
                    .collect();
                if !citations.is_empty() {
                    block = block.with_citations(citations);
                }
            }
            Ok(Some(block))
        }

        "thinking" => {
            let text = value.get("thinking").and_then(|t| t.as_str()).unwrap_or("");
            let signature = value.get("signature").and_then(|s| s.as_str()).unwrap_or("");

            // Thinking without a signature cannot be verified as extended
            // thinking; it degrades to plain text.
            if signature.is_empty() {
                return Ok(Some(
                    Block::text(text)
                        .with_sequence(sequence)
                        .with_source_backend(BackendId::Anthropic),
                ));
            }
            Ok(Some(
                Block::thinking(text)
                    .with_sequence(sequence)
                    .with_source_backend(BackendId::Anthropic)
                    .with_provider_data(json!({ "signature": signature })),
            ))
        }

        "tool_use" => {
            let id = value.get("id").and_then(|v| v.as_str()).unwrap_or("");
            let name = value.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let input = value.get("input").cloned().unwrap_or(json!({}));

            // The backend runs web_search itself; everything else is ours to
            // execute.
            let side = if name == "web_search" {
                ExecutionSide::Provider
            } else {
                ExecutionSide::Server
            };
            Ok(Some(
                Block::tool_use(id, name, input)
                    .with_sequence(sequence)
                    .with_execution_side(side)
                    .with_source_backend(BackendId::Anthropic),
            ))
        }

        "server_tool_use" => {
            let id = value.get("id").and_then(|v| v.as_str()).unwrap_or("");
            let name = value.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let input = value.get("input").cloned().unwrap_or(json!({}));

            // Sparse provider data rather than the raw SDK shape: exactly the
            // fields replay needs.
            let provider_data = json!({
                "type": "server_tool_use",
                "id": id,
                "name": name,
                "input": input.clone(),
            });

            let block = if name == "web_search" {
                Block::web_search_use_with_input(id, name, input)
            } else {
                Block::tool_use(id, name, input)
            };
            Ok(Some(
                block
                    .with_sequence(sequence)
                    .with_execution_side(ExecutionSide::Provider)
                    .with_source_backend(BackendId::Anthropic)
                    .with_provider_data(provider_data),
            ))
        }

        "web_search_tool_result" => Ok(Some(web_search_result_from_wire(value, sequence))),

        other => {
            warn!(block_type = other, "skipping unknown content block type");
            Ok(None)
        }
    }
}

fn web_search_result_from_wire(value: &serde_json::Value, sequence: usize) -> Block {
    let tool_use_id = value
        .get("tool_use_id")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let content = value.get("content").cloned().unwrap_or(serde_json::Value::Null);

    // The content union is either an error object or an array of results.
    let is_error = content
        .get("type")
        .and_then(|t| t.as_str())
        .map(|t| t == "web_search_tool_result_error")
        .unwrap_or(false);

    if is_error {
        let error_code = content
            .get("error_code")
            .and_then(|c| c.as_str())
            .unwrap_or("unknown");
        let provider_data = json!({
            "type": "web_search_tool_result",
            "tool_use_id": tool_use_id,
            "content": {
                "type": "web_search_tool_result_error",
                "error_code": error_code,
            },
        });
        return Block::web_search_error(tool_use_id, error_code)
            .with_sequence(sequence)
            .with_source_backend(BackendId::Anthropic)
            .with_provider_data(provider_data);
    }

    let sources = content.as_array().cloned().unwrap_or_default();
    let mut results = Vec::with_capacity(sources.len());
    let mut preserved = Vec::with_capacity(sources.len());
    for source in &sources {
        let url = source.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let title = source.get("title").and_then(|v| v.as_str()).unwrap_or("");
        let page_age = source.get("page_age").and_then(|v| v.as_str());
        let encrypted = source
            .get("encrypted_content")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        // Encrypted content cannot be decrypted locally, so the normalized
        // result carries no snippet; the raw form keeps it for replay.
        results.push(manifold_core::SearchResult {
            url: url.to_string(),
            title: (!title.is_empty()).then(|| title.to_string()),
            content: None,
            page_age: page_age.map(|s| s.to_string()),
        });

        let mut kept = json!({
            "type": "web_search_result",
            "url": url,
            "title": title,
        });
        if let Some(age) = page_age {
            kept["page_age"] = json!(age);
        }
        if !encrypted.is_empty() {
            kept["encrypted_content"] = json!(encrypted);
        }
        preserved.push(kept);
    }

    let provider_data = json!({
        "type": "web_search_tool_result",
        "tool_use_id": tool_use_id,
        "content": {
            "type": "web_search_tool_result_success",
            "results": preserved,
        },
    });

    Block::web_search_result(tool_use_id, results)
        .with_sequence(sequence)
        .with_source_backend(BackendId::Anthropic)
        .with_provider_data(provider_data)
}

fn citation_from_wire(cite: WireCitation) -> Citation {
    let mut citation = Citation::new(cite.kind.clone());
    if !cite.cited_text.is_empty() {
        citation.cited_text = Some(cite.cited_text);
    }

    match cite.kind.as_str() {
        "web_search_result_location" => {
            citation.url = cite.url;
            citation.title = cite.title;
            if !cite.encrypted_index.is_empty() {
                citation.provider_data = Some(json!({ "encrypted_index": cite.encrypted_index }));
            }
        }
        "search_result_location" => {
            citation.url = cite.url;
            citation.title = cite.title;
            if let Some(index) = cite.search_result_index {
                if index >= 0 {
                    citation.result_index = Some(index as usize);
                }
            }
            if !cite.source.is_empty() {
                citation.provider_data = Some(json!({ "source": cite.source }));
            }
        }
        "char_location" => {
            if let Some(start) = cite.start_char_index {
                if start >= 0 {
                    citation.start_index = Some(start as usize);
                }
            }
            if let Some(end) = cite.end_char_index {
                if end >= 0 {
                    citation.end_index = Some(end as usize);
                }
            }
            if !cite.document_title.is_empty() {
                citation.title = cite.document_title;
            }
        }
        _ => {
            citation.url = cite.url;
            citation.title = cite.title;
        }
    }

    citation
}

/// Convert a complete API response to the library shape.
pub fn response_from_wire(resp: MessagesResponse) -> Result<GenerateResponse> {
    let mut blocks = Vec::with_capacity(resp.content.len());
    for value in &resp.content {
        match block_from_wire(value, blocks.len()) {
            Ok(Some(block)) => blocks.push(block),
            Ok(None) => {}
            Err(err) => {
                warn!(%err, "failed to convert content block; continuing");
            }
        }
    }

    let mut response_metadata = serde_json::Map::new();
    if let Some(stop_sequence) = &resp.stop_sequence {
        if !stop_sequence.is_empty() {
            response_metadata.insert("stop_sequence".to_string(), json!(stop_sequence));
        }
    }
    if resp.usage.cache_creation_input_tokens > 0 {
        response_metadata.insert(
            "cache_creation_input_tokens".to_string(),
            json!(resp.usage.cache_creation_input_tokens),
        );
    }
    if resp.usage.cache_read_input_tokens > 0 {
        response_metadata.insert(
            "cache_read_input_tokens".to_string(),
            json!(resp.usage.cache_read_input_tokens),
        );
    }

    Ok(GenerateResponse {
        blocks,
        model: resp.model,
        input_tokens: resp.usage.input_tokens,
        output_tokens: resp.usage.output_tokens,
        stop_reason: resp.stop_reason.unwrap_or_default(),
        response_metadata,
    })
}
