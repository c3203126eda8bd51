//! Cross-backend tool splitting.
//!
//! An assistant turn may contain a provider-side tool call that a *different*
//! backend executed (e.g. Anthropic's server-side web search replayed to
//! OpenRouter). Replaying such a block verbatim would be rejected or leak
//! opaque data, so before dispatch the conversation is rewritten: the tool
//! call becomes a synthetic assistant sentence, its textual result becomes a
//! synthetic user turn, and the surrounding blocks are re-flushed around
//! them.

use tracing::debug;

use crate::backend::BackendId;
use crate::messages::{Block, BlockKind, Message, Role};

/// Rewrite messages so no provider-side tool block from a different backend
/// survives to the adapter's rendering stage.
///
/// Applied to assistant messages only; user messages pass through unchanged.
pub fn split_messages_at_cross_backend_tool(
    messages: Vec<Message>,
    current: BackendId,
) -> Vec<Message> {
    let mut result = Vec::with_capacity(messages.len());

    for msg in messages {
        if msg.role != Role::Assistant || !needs_split(&msg, current) {
            result.push(msg);
            continue;
        }

        let mut buffer: Vec<Block> = Vec::new();
        let mut i = 0;
        while i < msg.blocks.len() {
            let block = &msg.blocks[i];

            if is_foreign_provider_tool(block, current) {
                if !buffer.is_empty() {
                    result.push(
                        Message::new(Role::Assistant, std::mem::take(&mut buffer)).resequence(),
                    );
                }

                let tool_name = block.tool_name().filter(|n| !n.is_empty()).unwrap_or("search");
                result.push(Message::assistant(format!(
                    "I used the {tool_name} tool to help answer your question."
                )));

                let (results, consumed) = find_tool_result_blocks(&msg.blocks, i);
                result.push(Message::user(format_tool_results(&results)));

                i += 1 + consumed;
                continue;
            }

            buffer.push(block.clone());
            i += 1;
        }

        if !buffer.is_empty() {
            result.push(Message::new(Role::Assistant, buffer).resequence());
        }
    }

    result
}

fn needs_split(msg: &Message, current: BackendId) -> bool {
    msg.blocks
        .iter()
        .any(|b| is_foreign_provider_tool(b, current))
}

fn is_foreign_provider_tool(block: &Block, current: BackendId) -> bool {
    block.is_provider_side_tool() && block.is_from_different_backend(current)
}

/// Find the text blocks that carry a provider-side tool's results.
///
/// Only the *first* text block immediately following the tool call is treated
/// as its result; anything after that is the assistant's continuation.
/// Returns the result blocks and how many blocks were consumed.
fn find_tool_result_blocks(blocks: &[Block], tool_use_index: usize) -> (Vec<&Block>, usize) {
    if let Some(next) = blocks.get(tool_use_index + 1) {
        if next.kind() == BlockKind::Text {
            return (vec![next], 1);
        }
        debug!(
            following_kind = ?next.kind(),
            "provider-side tool call not followed by a text block; treating as no results"
        );
    }
    (Vec::new(), 0)
}

/// Format result blocks into the synthetic user-turn text.
fn format_tool_results(blocks: &[&Block]) -> String {
    if blocks.is_empty() {
        return "No results found.".to_string();
    }

    let mut out = String::from("Tool results:\n\n");
    for block in blocks {
        if let Some(text) = block.text_content() {
            out.push_str(text);
            out.push_str("\n\n");
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ExecutionSide;
    use serde_json::json;

    fn foreign_search(id: &str) -> Block {
        Block::tool_use(id, "web_search", json!({"query": "answer"}))
            .with_execution_side(ExecutionSide::Provider)
            .with_source_backend(BackendId::Anthropic)
    }

    #[test]
    fn test_passthrough_without_foreign_tools() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let out = split_messages_at_cross_backend_tool(messages.clone(), BackendId::OpenRouter);
        assert_eq!(out, messages);
    }

    #[test]
    fn test_same_backend_tool_is_not_split() {
        let msg = Message::new(Role::Assistant, vec![foreign_search("id"), Block::text("r")]);
        let out = split_messages_at_cross_backend_tool(vec![msg.clone()], BackendId::Anthropic);
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn test_split_with_result_and_continuation() {
        // [tool_use(foreign), text(results), text(answer)] →
        // assistant "I used…", user "Tool results: …", assistant answer
        let msg = Message::new(
            Role::Assistant,
            vec![
                foreign_search("srvtoolu_1").with_sequence(0),
                Block::text("Sources: example.com").with_sequence(1),
                Block::text("So the answer is 42.").with_sequence(2),
            ],
        );
        let out = split_messages_at_cross_backend_tool(vec![msg], BackendId::OpenRouter);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].role, Role::Assistant);
        assert_eq!(
            out[0].blocks[0].text_content(),
            Some("I used the web_search tool to help answer your question.")
        );
        assert_eq!(out[1].role, Role::User);
        assert_eq!(
            out[1].blocks[0].text_content(),
            Some("Tool results:\n\nSources: example.com")
        );
        assert_eq!(out[2].role, Role::Assistant);
        assert_eq!(out[2].blocks[0].text_content(), Some("So the answer is 42."));
        assert_eq!(out[2].blocks[0].sequence, 0);
    }

    #[test]
    fn test_split_without_following_text() {
        let msg = Message::new(Role::Assistant, vec![foreign_search("id")]);
        let out = split_messages_at_cross_backend_tool(vec![msg], BackendId::OpenRouter);

        assert_eq!(out.len(), 2);
        assert_eq!(out[1].blocks[0].text_content(), Some("No results found."));
    }

    #[test]
    fn test_only_first_text_block_is_consumed() {
        let msg = Message::new(
            Role::Assistant,
            vec![
                Block::text("Let me search."),
                foreign_search("id"),
                Block::text("result one"),
                Block::text("result two"),
            ],
        );
        let out = split_messages_at_cross_backend_tool(vec![msg], BackendId::OpenRouter);

        // preamble, synthetic assistant, synthetic user, continuation
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].blocks[0].text_content(), Some("Let me search."));
        assert_eq!(
            out[2].blocks[0].text_content(),
            Some("Tool results:\n\nresult one")
        );
        assert_eq!(out[3].blocks[0].text_content(), Some("result two"));
    }

    #[test]
    fn test_user_messages_untouched() {
        let user = Message::new(Role::User, vec![foreign_search("id")]);
        let out = split_messages_at_cross_backend_tool(vec![user.clone()], BackendId::OpenRouter);
        assert_eq!(out, vec![user]);
    }
}
