//! Streaming aggregation for OpenRouter chat completions.
//!
//! SSE chunks are decomposed with the same parse/transition functions as the
//! non-streaming path; this module adds the per-call accumulation state:
//! string builders for the open text/thinking block, a map of in-flight tool
//! calls, and sticky model/stop-reason/usage values for the terminal
//! metadata event.

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

use super::convert::{
    BlockState, annotations_to_web_search_blocks, determine_transition, parse_delta,
};
use super::wire::{ApiErrorEnvelope, ChatCompletionChunk, ToolCall, Usage};

use crate::sse::{LineBuffer, SendOutcome, send_cancelled, send_event};

enum Flow {
    Continue,
    Stop,
    /// The `[DONE]` sentinel arrived; finalize and terminate.
    Done,
}

/// One tool call being accumulated across chunks.
struct ToolCallAcc {
    id: String,
    name: String,
    arguments: String,
    /// Event block index assigned when the call first appeared; the final
    /// block reuses it so deltas and completion stay paired.
    block_index: usize,
}

#[derive(Default)]
struct Aggregator {
    state: BlockState,
    thinking: String,
    text: String,
    tool_calls: BTreeMap<usize, ToolCallAcc>,
    search_count: usize,
    model: String,
    stop_reason: String,
    usage: Option<Usage>,
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

    'read: loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                send_cancelled(&tx).await;
                return;
            }
            chunk = upstream.next() => chunk,
        };

        let bytes = match chunk {
            None => break 'read,
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
                Flow::Done => break 'read,
            }
        }
    }

    agg.finalize(&tx, &cancel).await;
}

impl Aggregator {
    async fn handle_line(
        &mut self,
        line: &str,
        tx: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Flow {
        // SSE comments and blank keep-alives.
        if line.is_empty() || line.starts_with(':') {
            return Flow::Continue;
        }
        let Some(data) = line.strip_prefix("data: ") else {
            return Flow::Continue;
        };
        if data == "[DONE]" {
            return Flow::Done;
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(_) => {
                // A chunk that fails to parse may be an error envelope.
                if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(data) {
                    if !envelope.error.message.is_empty() {
                        let err = Error::Stream {
                            backend: BackendId::OpenRouter,
                            message: envelope.error.message,
                        };
                        let _ = send_event(tx, cancel, StreamEvent::Error(err)).await;
                        return Flow::Stop;
                    }
                }
                debug!("ignoring unparseable stream chunk");
                return Flow::Continue;
            }
        };

        if !chunk.model.is_empty() {
            self.model = chunk.model;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Flow::Continue;
        };

        let parsed = parse_delta(
            &choice.delta.annotations,
            &choice.delta.reasoning_details,
            choice.delta.content.as_deref(),
        );

        // 1. Web search blocks, once per stream. Emitted before the
        // transition is computed so the synthetic pair claims its indexes
        // ahead of the content block.
        if let Some(annotations) = &parsed.web_search {
            if !self.state.web_search_done {
                let id = format!("or_websearch_{}", self.search_count);
                self.search_count += 1;
                let blocks = annotations_to_web_search_blocks(
                    annotations,
                    self.state.current_index,
                    &id,
                );
                self.state.current_index += blocks.len();
                self.state.web_search_done = true;
                for block in blocks {
                    if !matches!(
                        self.forward(tx, cancel, StreamEvent::Block(block)).await,
                        Flow::Continue
                    ) {
                        return Flow::Stop;
                    }
                }
            }
        }

        let transition = determine_transition(self.state, &parsed);

        // 2. Close the finished thinking block before its successor starts.
        if transition.close_previous
            && self.state.current_kind == Some(BlockKind::Thinking)
            && !self.thinking.is_empty()
        {
            let block = self.take_thinking_block(self.state.current_index);
            if !matches!(
                self.forward(tx, cancel, StreamEvent::Block(block)).await,
                Flow::Continue
            ) {
                return Flow::Stop;
            }
        }

        // 3. Open the new block.
        if let Some(kind) = transition.start_new {
            let delta = BlockDelta::block_start(transition.new_index, kind);
            if !matches!(
                self.forward(tx, cancel, StreamEvent::Delta(delta)).await,
                Flow::Continue
            ) {
                return Flow::Stop;
            }
            self.state.current_kind = Some(kind);
            self.state.current_index = transition.new_index;
        }

        // 4. Thinking delta.
        if let Some(thinking) = &parsed.thinking {
            if self.state.current_kind == Some(BlockKind::Thinking) {
                self.thinking.push_str(&thinking.text);
                let delta = BlockDelta::text(self.state.current_index, thinking.text.clone());
                if !matches!(
                    self.forward(tx, cancel, StreamEvent::Delta(delta)).await,
                    Flow::Continue
                ) {
                    return Flow::Stop;
                }
            }
        }

        // 5. Text delta.
        if let Some(text) = &parsed.text {
            if self.state.current_kind == Some(BlockKind::Text) {
                self.text.push_str(text);
                let delta = BlockDelta::text(self.state.current_index, text.clone());
                if !matches!(
                    self.forward(tx, cancel, StreamEvent::Delta(delta)).await,
                    Flow::Continue
                ) {
                    return Flow::Stop;
                }
            }
        }

        // 6. Tool call accumulation.
        for tool_call in choice.delta.tool_calls {
            match self.handle_tool_call(tool_call, tx, cancel).await {
                Flow::Continue => {}
                other => return other,
            }
        }

        if let Some(finish_reason) = &choice.finish_reason {
            self.stop_reason = normalize_stop_reason(finish_reason);
        }

        Flow::Continue
    }

    async fn handle_tool_call(
        &mut self,
        tool_call: ToolCall,
        tx: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Flow {
        // Map index priority: the backend's own index, then lookup by id,
        // then append order.
        let idx = tool_call
            .index
            .or_else(|| {
                (!tool_call.id.is_empty())
                    .then(|| {
                        self.tool_calls
                            .iter()
                            .find(|(_, acc)| acc.id == tool_call.id)
                            .map(|(idx, _)| *idx)
                    })
                    .flatten()
            })
            .unwrap_or(self.tool_calls.len());

        if !self.tool_calls.contains_key(&idx) {
            let block_index = self.tool_block_base() + idx;
            debug!(
                idx,
                block_index,
                id = %tool_call.id,
                name = %tool_call.function.name,
                "tool call started"
            );
            self.tool_calls.insert(
                idx,
                ToolCallAcc {
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                    block_index,
                },
            );
            let delta =
                BlockDelta::tool_call_start(block_index, &tool_call.id, &tool_call.function.name);
            if !matches!(
                self.forward(tx, cancel, StreamEvent::Delta(delta)).await,
                Flow::Continue
            ) {
                return Flow::Stop;
            }
        }

        let acc = self.tool_calls.get_mut(&idx).expect("just inserted");
        if !tool_call.id.is_empty() {
            acc.id = tool_call.id;
        }
        if !tool_call.function.name.is_empty() {
            acc.name = tool_call.function.name;
        }
        if !tool_call.function.arguments.is_empty() {
            acc.arguments.push_str(&tool_call.function.arguments);
            let delta =
                BlockDelta::input_json(acc.block_index, tool_call.function.arguments);
            if !matches!(
                self.forward(tx, cancel, StreamEvent::Delta(delta)).await,
                Flow::Continue
            ) {
                return Flow::Stop;
            }
        }

        Flow::Continue
    }

    /// Index where tool-call blocks begin: after the currently open
    /// text/thinking block, if any.
    fn tool_block_base(&self) -> usize {
        self.state.current_index + usize::from(self.state.current_kind.is_some())
    }

    fn take_thinking_block(&mut self, sequence: usize) -> Block {
        let text = std::mem::take(&mut self.thinking);
        Block::thinking(text)
            .with_sequence(sequence)
            .with_source_backend(BackendId::OpenRouter)
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

    /// Emit the still-open content block, then each accumulated tool call as
    /// a complete block, then the terminal metadata.
    async fn finalize(mut self, tx: &mpsc::Sender<StreamEvent>, cancel: &CancellationToken) {
        match self.state.current_kind {
            Some(BlockKind::Thinking) if !self.thinking.is_empty() => {
                let block = self.take_thinking_block(self.state.current_index);
                if !matches!(
                    self.forward(tx, cancel, StreamEvent::Block(block)).await,
                    Flow::Continue
                ) {
                    return;
                }
                self.state.current_index += 1;
            }
            Some(BlockKind::Text) if !self.text.is_empty() => {
                let text = std::mem::take(&mut self.text);
                let block = Block::text(text)
                    .with_sequence(self.state.current_index)
                    .with_source_backend(BackendId::OpenRouter);
                if !matches!(
                    self.forward(tx, cancel, StreamEvent::Block(block)).await,
                    Flow::Continue
                ) {
                    return;
                }
                self.state.current_index += 1;
            }
            _ => {}
        }

        let base = self.state.current_index;
        for (idx, acc) in std::mem::take(&mut self.tool_calls) {
            let input: serde_json::Value = if acc.arguments.trim().is_empty() {
                json!({})
            } else {
                match serde_json::from_str(&acc.arguments) {
                    Ok(input) => input,
                    Err(err) => {
                        warn!(
                            id = %acc.id,
                            arguments = %acc.arguments,
                            %err,
                            "malformed tool call arguments"
                        );
                        let error = Error::invalid_value(
                            format!("tool_calls.{}", acc.id),
                            acc.arguments.clone(),
                            format!("received malformed JSON: {err}"),
                        );
                        let _ = send_event(tx, cancel, StreamEvent::Error(error)).await;
                        return;
                    }
                }
            };

            let block = Block::tool_use(acc.id, acc.name, input)
                .with_sequence(base + idx)
                .with_execution_side(ExecutionSide::Server)
                .with_source_backend(BackendId::OpenRouter);
            if !matches!(
                self.forward(tx, cancel, StreamEvent::Block(block)).await,
                Flow::Continue
            ) {
                return;
            }
        }

        let mut metadata = StreamMetadata {
            model: self.model.clone(),
            stop_reason: self.stop_reason.clone(),
            ..Default::default()
        };
        if let Some(usage) = self.usage {
            metadata.input_tokens = usage.prompt_tokens;
            metadata.output_tokens = usage.completion_tokens;
            metadata
                .response_metadata
                .insert("total_tokens".to_string(), json!(usage.total_tokens));
        }
        let _ = send_event(tx, cancel, StreamEvent::Metadata(metadata)).await;
    }
}
