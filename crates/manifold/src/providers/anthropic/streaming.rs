//! Streaming aggregation for the Anthropic messages API.
//!
//! The producer task reads SSE lines, tracks per-index block assembly, and
//! emits the uniform event sequence: block-start deltas, content deltas,
//! assembled blocks on `content_block_stop`, and one terminal metadata or
//! error event.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use manifold_core::{
    BackendId, Block, BlockDelta, BlockKind, Error, ExecutionSide, StreamEvent, StreamMetadata,
    normalize_stop_reason,
};

use super::convert::block_from_wire;
use super::wire::{ContentDelta, StreamChunk};

use crate::sse::{LineBuffer, SendOutcome, send_cancelled, send_event};

enum Flow {
    Continue,
    Stop,
}

/// A block currently being assembled.
enum OpenBlock {
    Text(String),
    Thinking { text: String, signature: String },
    ToolUse { id: String, name: String, args: String },
    /// Backend-specific block held raw until its stop event.
    Raw(serde_json::Value),
}

#[derive(Default)]
struct Aggregator {
    open: BTreeMap<usize, OpenBlock>,
    last_index: usize,
    model: String,
    stop_reason: String,
    stop_sequence: Option<String>,
    input_tokens: u32,
    output_tokens: u32,
    cache_creation_tokens: u32,
    cache_read_tokens: u32,
}

/// Drive one upstream SSE stream to completion, writing events to `tx`.
/// Closes the channel exactly once by returning.
pub(super) async fn run_stream<S>(
    mut upstream: S,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Vec<u8>, Error>> + Unpin,
{
    let mut agg = Aggregator::default();
    let mut lines = LineBuffer::new();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                send_cancelled(&tx).await;
                return;
            }
            chunk = upstream.next() => chunk,
        };

        let bytes = match chunk {
            None => break,
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                let _ = tx.send(StreamEvent::Error(err)).await;
                return;
            }
        };

        lines.extend(&bytes);
        while let Some(line) = lines.next_line() {
            match agg.handle_line(&line, &tx, &cancel).await {
                Flow::Continue => {}
                Flow::Stop => return,
            }
        }
    }

    // Upstream closed without message_stop; flush whatever was assembled.
    agg.finalize(&tx, &cancel).await;
}

impl Aggregator {
    async fn handle_line(
        &mut self,
        line: &str,
        tx: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Flow {
        let Some(data) = line.strip_prefix("data: ") else {
            return Flow::Continue;
        };

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(err) => {
                debug!(%err, "ignoring unparseable stream chunk");
                return Flow::Continue;
            }
        };

        match chunk {
            StreamChunk::MessageStart { message } => {
                self.model = message.model;
                self.input_tokens = message.usage.input_tokens;
                self.output_tokens = message.usage.output_tokens;
                self.cache_creation_tokens = message.usage.cache_creation_input_tokens;
                self.cache_read_tokens = message.usage.cache_read_input_tokens;
                Flow::Continue
            }

            StreamChunk::ContentBlockStart {
                index,
                content_block,
            } => {
                self.last_index = index;
                let kind = content_block
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("");

                let delta = match kind {
                    "text" => {
                        self.open.insert(index, OpenBlock::Text(String::new()));
                        BlockDelta::block_start(index, BlockKind::Text)
                    }
                    "thinking" => {
                        self.open.insert(
                            index,
                            OpenBlock::Thinking {
                                text: String::new(),
                                signature: String::new(),
                            },
                        );
                        BlockDelta::block_start(index, BlockKind::Thinking)
                    }
                    "tool_use" => {
                        let id = content_block
                            .get("id")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        let name = content_block
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string();
                        self.open.insert(
                            index,
                            OpenBlock::ToolUse {
                                id: id.clone(),
                                name: name.clone(),
                                args: String::new(),
                            },
                        );
                        BlockDelta::tool_call_start(index, id, name)
                    }
                    other => {
                        debug!(block_type = other, index, "holding raw content block");
                        self.open.insert(index, OpenBlock::Raw(content_block));
                        return Flow::Continue;
                    }
                };

                self.forward(tx, cancel, StreamEvent::Delta(delta)).await
            }

            StreamChunk::ContentBlockDelta { index, delta } => {
                let event = match delta {
                    ContentDelta::TextDelta { text } => {
                        if let Some(OpenBlock::Text(acc)) = self.open.get_mut(&index) {
                            acc.push_str(&text);
                        }
                        BlockDelta::text(index, text)
                    }
                    ContentDelta::ThinkingDelta { thinking } => {
                        if let Some(OpenBlock::Thinking { text, .. }) = self.open.get_mut(&index) {
                            text.push_str(&thinking);
                        }
                        BlockDelta::text(index, thinking)
                    }
                    ContentDelta::SignatureDelta { signature } => {
                        if let Some(OpenBlock::Thinking {
                            signature: sig, ..
                        }) = self.open.get_mut(&index)
                        {
                            sig.push_str(&signature);
                        }
                        BlockDelta::signature(index, signature)
                    }
                    ContentDelta::InputJsonDelta { partial_json } => {
                        if let Some(OpenBlock::ToolUse { args, .. }) = self.open.get_mut(&index) {
                            args.push_str(&partial_json);
                        }
                        BlockDelta::input_json(index, partial_json)
                    }
                    ContentDelta::Unknown => return Flow::Continue,
                };

                self.forward(tx, cancel, StreamEvent::Delta(event)).await
            }

            StreamChunk::ContentBlockStop { index } => {
                match self.close_block(index) {
                    Ok(Some(block)) => self.forward(tx, cancel, StreamEvent::Block(block)).await,
                    Ok(None) => Flow::Continue,
                    Err(err) => {
                        let _ = send_event(tx, cancel, StreamEvent::Error(err)).await;
                        Flow::Stop
                    }
                }
            }

            StreamChunk::MessageDelta { delta, usage } => {
                if let Some(stop_reason) = delta.stop_reason {
                    self.stop_reason = stop_reason;
                }
                if let Some(stop_sequence) = delta.stop_sequence {
                    self.stop_sequence = Some(stop_sequence);
                }
                if let Some(usage) = usage {
                    if let Some(input) = usage.input_tokens {
                        self.input_tokens = input;
                    }
                    self.output_tokens = usage.output_tokens;
                    if usage.cache_creation_input_tokens > 0 {
                        self.cache_creation_tokens = usage.cache_creation_input_tokens;
                    }
                    if usage.cache_read_input_tokens > 0 {
                        self.cache_read_tokens = usage.cache_read_input_tokens;
                    }
                    let delta = BlockDelta::usage(
                        self.last_index,
                        self.input_tokens,
                        self.output_tokens,
                    );
                    return self.forward(tx, cancel, StreamEvent::Delta(delta)).await;
                }
                Flow::Continue
            }

            StreamChunk::MessageStop => {
                self.finalize(tx, cancel).await;
                Flow::Stop
            }

            StreamChunk::Error { error } => {
                let err = Error::Stream {
                    backend: BackendId::Anthropic,
                    message: error.message,
                };
                let _ = send_event(tx, cancel, StreamEvent::Error(err)).await;
                Flow::Stop
            }

            StreamChunk::Ping | StreamChunk::Unknown => Flow::Continue,
        }
    }

    async fn forward(
        &self,
        tx: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
        event: StreamEvent,
    ) -> Flow {
        match send_event(tx, cancel, event).await {
            SendOutcome::Sent => Flow::Continue,
            SendOutcome::Cancelled | SendOutcome::Closed => Flow::Stop,
        }
    }

    /// Assemble the completed block at `index` from its accumulated state.
    fn close_block(&mut self, index: usize) -> Result<Option<Block>, Error> {
        let Some(open) = self.open.remove(&index) else {
            warn!(index, "content_block_stop for unknown block index");
            return Ok(None);
        };

        match open {
            OpenBlock::Text(text) => Ok(Some(
                Block::text(text)
                    .with_sequence(index)
                    .with_source_backend(BackendId::Anthropic),
            )),

            OpenBlock::Thinking { text, signature } => {
                let mut block = Block::thinking(text)
                    .with_sequence(index)
                    .with_source_backend(BackendId::Anthropic);
                if !signature.is_empty() {
                    block = block.with_provider_data(json!({ "signature": signature }));
                }
                Ok(Some(block))
            }

            OpenBlock::ToolUse { id, name, args } => {
                let input = if args.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&args).map_err(|err| {
                        Error::invalid_value(
                            format!("tool_calls.{id}"),
                            args.clone(),
                            format!("malformed tool input JSON: {err}"),
                        )
                    })?
                };
                let side = if name == "web_search" {
                    ExecutionSide::Provider
                } else {
                    ExecutionSide::Server
                };
                Ok(Some(
                    Block::tool_use(id, name, input)
                        .with_sequence(index)
                        .with_execution_side(side)
                        .with_source_backend(BackendId::Anthropic),
                ))
            }

            OpenBlock::Raw(value) => match block_from_wire(&value, index) {
                Ok(block) => Ok(block),
                Err(err) => {
                    warn!(%err, index, "failed to convert raw content block");
                    Ok(None)
                }
            },
        }
    }

    /// Emit any still-open blocks in index order, then the terminal metadata.
    async fn finalize(&mut self, tx: &mpsc::Sender<StreamEvent>, cancel: &CancellationToken) {
        let indexes: Vec<usize> = self.open.keys().copied().collect();
        for index in indexes {
            match self.close_block(index) {
                Ok(Some(block)) => {
                    if !matches!(
                        self.forward(tx, cancel, StreamEvent::Block(block)).await,
                        Flow::Continue
                    ) {
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    let _ = send_event(tx, cancel, StreamEvent::Error(err)).await;
                    return;
                }
            }
        }

        let mut response_metadata = serde_json::Map::new();
        if let Some(stop_sequence) = &self.stop_sequence {
            if !stop_sequence.is_empty() {
                response_metadata.insert("stop_sequence".to_string(), json!(stop_sequence));
            }
        }
        if self.cache_creation_tokens > 0 {
            response_metadata.insert(
                "cache_creation_input_tokens".to_string(),
                json!(self.cache_creation_tokens),
            );
        }
        if self.cache_read_tokens > 0 {
            response_metadata.insert(
                "cache_read_input_tokens".to_string(),
                json!(self.cache_read_tokens),
            );
        }

        let metadata = StreamMetadata {
            model: self.model.clone(),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            stop_reason: normalize_stop_reason(&self.stop_reason),
            response_metadata,
        };
        let _ = send_event(tx, cancel, StreamEvent::Metadata(metadata)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use manifold_core::DeltaPayload;

    fn sse(lines: &[&str]) -> Vec<Result<Vec<u8>, Error>> {
        lines
            .iter()
            .map(|l| Ok(format!("{l}\n").into_bytes()))
            .collect()
    }

    async fn collect(events: Vec<Result<Vec<u8>, Error>>) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        run_stream(stream::iter(events), tx, cancel).await;
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_text_stream_happy_path() {
        let events = collect(sse(&[
            r#"data: {"type":"message_start","message":{"model":"claude-sonnet-4-5","usage":{"input_tokens":12,"output_tokens":1}}}"#,
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" world"}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":7}}"#,
            r#"data: {"type":"message_stop"}"#,
        ]))
        .await;

        // First delta opens the block with its kind.
        let first = events[0].as_delta().unwrap();
        assert_eq!(first.block_kind, Some(BlockKind::Text));
        assert_eq!(first.block_index, 0);

        let block = events
            .iter()
            .find_map(|e| e.as_block())
            .expect("complete block");
        assert_eq!(block.sequence, 0);
        assert_eq!(block.text_content(), Some("Hello world"));
        assert_eq!(block.source_backend, Some(BackendId::Anthropic));

        let last = events.last().unwrap();
        let meta = last.as_metadata().expect("metadata terminator");
        assert_eq!(meta.stop_reason, "end_turn");
        assert_eq!(meta.output_tokens, 7);
        assert_eq!(meta.model, "claude-sonnet-4-5");
    }

    #[tokio::test]
    async fn test_thinking_then_text_ordering() {
        let events = collect(sse(&[
            r#"data: {"type":"message_start","message":{"model":"claude-sonnet-4-5","usage":{"input_tokens":5,"output_tokens":0}}}"#,
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"pondering"}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"sig_abc"}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
            r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"text","text":""}}"#,
            r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"answer"}}"#,
            r#"data: {"type":"content_block_stop","index":1}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":3}}"#,
            r#"data: {"type":"message_stop"}"#,
        ]))
        .await;

        let kinds: Vec<String> = events
            .iter()
            .map(|e| match e {
                StreamEvent::Delta(d) => format!("delta:{}", d.block_index),
                StreamEvent::Block(b) => format!("block:{}", b.sequence),
                StreamEvent::Metadata(_) => "metadata".to_string(),
                StreamEvent::Error(_) => "error".to_string(),
            })
            .collect();
        // All deltas for block 0 precede its completion, which precedes any
        // event for block 1.
        let block0 = kinds.iter().position(|k| k == "block:0").unwrap();
        let first1 = kinds.iter().position(|k| k == "delta:1").unwrap();
        assert!(block0 < first1, "order was {kinds:?}");

        let thinking = events
            .iter()
            .find_map(|e| e.as_block())
            .expect("thinking block");
        assert_eq!(thinking.kind(), BlockKind::Thinking);
        assert_eq!(
            thinking.provider_data.as_ref().unwrap()["signature"],
            "sig_abc"
        );

        // Signature delta was forwarded before the block completed.
        assert!(events.iter().any(|e| matches!(
            e.as_delta().map(|d| &d.payload),
            Some(DeltaPayload::Signature { .. })
        )));
    }

    #[tokio::test]
    async fn test_tool_call_assembly() {
        let events = collect(sse(&[
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"bash","input":{}}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"comm"}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"and\":\"ls\"}"}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":9}}"#,
            r#"data: {"type":"message_stop"}"#,
        ]))
        .await;

        let start = events[0].as_delta().unwrap();
        assert!(matches!(
            &start.payload,
            DeltaPayload::ToolCallStart { id, name } if id == "toolu_1" && name == "bash"
        ));

        let block = events.iter().find_map(|e| e.as_block()).unwrap();
        assert_eq!(block.tool_name(), Some("bash"));
        assert_eq!(block.tool_input().unwrap()["command"], "ls");
        assert_eq!(block.execution_side, Some(ExecutionSide::Server));

        let meta = events.last().unwrap().as_metadata().unwrap();
        assert_eq!(meta.stop_reason, "tool_use");
    }

    #[tokio::test]
    async fn test_malformed_tool_json_terminates_with_error() {
        let events = collect(sse(&[
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_bad","name":"bash","input":{}}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"command\": nope"}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
        ]))
        .await;

        let last = events.last().unwrap();
        let err = last.as_error().expect("error terminator");
        let message = err.to_string();
        assert!(message.contains("toolu_bad"), "message: {message}");
        assert!(err.is_invalid_request());
        // No metadata after the error.
        assert!(events.iter().filter(|e| e.is_terminal()).count() == 1);
    }

    #[tokio::test]
    async fn test_cancellation_emits_error_and_stops() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();
        run_stream(
            stream::iter(sse(&[r#"data: {"type":"message_stop"}"#])),
            tx,
            cancel,
        )
        .await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, StreamEvent::Error(Error::Cancelled)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_upstream_end_without_message_stop_still_terminates() {
        let events = collect(sse(&[
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"partial"}}"#,
        ]))
        .await;

        // The open text block is flushed, then metadata terminates.
        let block = events.iter().find_map(|e| e.as_block()).unwrap();
        assert_eq!(block.text_content(), Some("partial"));
        assert!(events.last().unwrap().as_metadata().is_some());
    }

    #[tokio::test]
    async fn test_stream_error_event() {
        let events = collect(sse(&[
            r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ]))
        .await;
        let err = events.last().unwrap().as_error().unwrap();
        assert!(err.to_string().contains("Overloaded"));
    }
}
