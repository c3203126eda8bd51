//! Mock lorem-ipsum backend for testing and development.
//!
//! No credentials, no network. The producer is scripted and deterministic,
//! keyed off substrings of the model name:
//!
//! - `slow` / `medium` / `fast` pick the inter-word delay (500/100/33 ms)
//! - `cutoff` / `small` generate past max-tokens and stop with `max_tokens`
//! - with thinking enabled the producer rotates text → thinking → tool_use
//!   blocks of twenty words each, finishing thinking blocks with a terminal
//!   signature delta the way native reasoning blocks arrive

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use manifold_core::{
    BackendId, Block, BlockDelta, BlockKind, Error, EventStream, GenerateRequest,
    GenerateResponse, Message, Provider, RequestParams, Result, StreamEvent, StreamMetadata,
    Tool, EVENT_CHANNEL_CAPACITY,
};
use tokio_stream::wrappers::ReceiverStream;

use crate::sse::{SendOutcome, send_cancelled, send_event};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const WORDS_PER_BLOCK: u32 = 20;
const MOCK_SIGNATURE: &str = "4k_a";

const WORDS: &[&str] = &[
    "lorem",
    "ipsum",
    "dolor",
    "sit",
    "amet",
    "consectetur",
    "adipiscing",
    "elit",
    "sed",
    "do",
    "eiusmod",
    "tempor",
    "incididunt",
    "ut",
    "labore",
    "et",
    "dolore",
    "magna",
    "aliqua",
    "enim",
    "ad",
    "minim",
    "veniam",
    "quis",
    "nostrud",
    "exercitation",
    "ullamco",
    "laboris",
    "nisi",
    "aliquip",
    "ex",
    "ea",
    "commodo",
    "consequat",
];

/// Inter-word delay by model speed class.
fn stream_delay(model: &str) -> Duration {
    if model.contains("slow") {
        Duration::from_millis(500)
    } else if model.contains("fast") {
        Duration::from_millis(33)
    } else {
        Duration::from_millis(100)
    }
}

/// Cutoff models generate past max-tokens and stop mid-block.
fn is_cutoff_model(model: &str) -> bool {
    model.contains("cutoff") || model.contains("small")
}

/// Deterministic word source cycling the fixed vocabulary.
fn next_word(cursor: &mut usize) -> &'static str {
    let word = WORDS[*cursor % WORDS.len()];
    *cursor += 1;
    word
}

fn mock_tool_input(tool: &Tool) -> serde_json::Value {
    match tool.function.name.as_str() {
        "search" => json!({ "query": "lorem ipsum dolor sit amet" }),
        "text_editor" => json!({
            "command": "str_replace",
            "file_path": "/path/to/file.txt",
            "old_str": "consectetur",
            "new_str": "adipiscing",
        }),
        "bash" => json!({ "command": "echo 'lorem ipsum'" }),
        _ => json!({ "param1": "lorem", "param2": "ipsum" }),
    }
}

fn estimate_tokens(messages: &[Message]) -> u32 {
    messages
        .iter()
        .flat_map(|m| &m.blocks)
        .filter_map(|b| b.text_content())
        .map(|t| t.split_whitespace().count() as u32)
        .sum()
}

/// Scripted producer signalled to stop: whoever observed the reason already
/// delivered the terminal event.
struct Abort;

/// [`Provider`] implementation backed by the deterministic lorem generator.
#[derive(Debug, Clone, Default)]
pub struct LoremProvider;

impl LoremProvider {
    pub fn new() -> Self {
        Self
    }

    fn check_model(&self, model: &str) -> Result<()> {
        if self.supports_model(model) {
            return Ok(());
        }
        Err(Error::invalid_model(
            BackendId::Lorem,
            model,
            "model not supported by Lorem backend (must start with 'lorem-')",
        ))
    }
}

#[async_trait]
impl Provider for LoremProvider {
    /// Produce one text block sized to the token budget, after a simulated
    /// processing delay derived from the model's speed class.
    async fn generate(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse> {
        self.check_model(&req.model)?;
        let max_tokens = req.params.max_tokens_or(DEFAULT_MAX_TOKENS);

        let delay = stream_delay(&req.model) * 10;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        let mut cursor = 0;
        let words: Vec<&str> = (0..max_tokens).map(|_| next_word(&mut cursor)).collect();
        let text = words.join(" ");
        let output_tokens = words.len() as u32;

        let mut response_metadata = serde_json::Map::new();
        response_metadata.insert("mock".to_string(), json!(true));
        response_metadata.insert("backend".to_string(), json!("lorem"));

        Ok(GenerateResponse {
            blocks: vec![
                Block::text(text)
                    .with_sequence(0)
                    .with_source_backend(BackendId::Lorem),
            ],
            model: req.model.clone(),
            input_tokens: estimate_tokens(&req.messages),
            output_tokens,
            stop_reason: "end_turn".to_string(),
            response_metadata,
        })
    }

    async fn stream(
        &self,
        req: &GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream> {
        self.check_model(&req.model)?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let model = req.model.clone();
        let params = req.params.clone();
        let input_tokens = estimate_tokens(&req.messages);

        tokio::spawn(async move {
            let _ = run_script(model, params, input_tokens, tx, cancel).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> BackendId {
        BackendId::Lorem
    }

    /// Lorem model identifiers start with "lorem-".
    fn supports_model(&self, model: &str) -> bool {
        model.starts_with("lorem-")
    }
}

/// The scripted stream: rotate block kinds until the token budget runs out,
/// then emit the terminal metadata.
async fn run_script(
    model: String,
    params: RequestParams,
    input_tokens: u32,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) -> std::result::Result<(), Abort> {
    let max_tokens = params.max_tokens_or(DEFAULT_MAX_TOKENS);
    let thinking_enabled = params.thinking_enabled();
    let tools = &params.tools;
    let delay = stream_delay(&model);
    let cutoff = is_cutoff_model(&model);

    let mut block_index = 0usize;
    let mut total_tokens = 0u32;
    let mut stop_reason = "end_turn";
    let mut tool_rotation = 0usize;
    let mut cursor = 0usize;

    while total_tokens < max_tokens {
        let remaining = max_tokens - total_tokens;

        if block_index % 3 == 0 || (block_index % 3 == 1 && !thinking_enabled) {
            let target = remaining.min(WORDS_PER_BLOCK);
            let (words, hit_cutoff) = stream_text_block(
                &tx,
                &cancel,
                block_index,
                target,
                remaining,
                cutoff,
                delay,
                &mut cursor,
            )
            .await?;
            total_tokens += words;
            block_index += 1;
            if hit_cutoff {
                stop_reason = "max_tokens";
                break;
            }
        } else if block_index % 3 == 1 && thinking_enabled {
            let target = remaining.min(WORDS_PER_BLOCK);
            let words =
                stream_thinking_block(&tx, &cancel, block_index, target, delay, &mut cursor)
                    .await?;
            total_tokens += words;
            block_index += 1;
        } else if !tools.is_empty() {
            if remaining < WORDS_PER_BLOCK {
                break;
            }
            let tool = &tools[tool_rotation % tools.len()];
            let tokens = stream_tool_use_block(&tx, &cancel, block_index, tool, delay).await?;
            total_tokens += tokens;
            block_index += 1;
            tool_rotation += 1;
        } else {
            block_index += 1;
        }

        // Runaway guard.
        if block_index > 100 {
            break;
        }
    }

    let mut response_metadata = serde_json::Map::new();
    response_metadata.insert("mock".to_string(), json!(true));
    response_metadata.insert("backend".to_string(), json!("lorem"));

    send(
        &tx,
        &cancel,
        StreamEvent::Metadata(StreamMetadata {
            model,
            input_tokens,
            output_tokens: total_tokens,
            stop_reason: stop_reason.to_string(),
            response_metadata,
        }),
    )
    .await
}

/// Stream one text block word by word. Cutoff models overshoot the budget by
/// half and get cut at the limit. Returns (words sent, cutoff hit).
#[allow(clippy::too_many_arguments)]
async fn stream_text_block(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    block_index: usize,
    target_words: u32,
    budget: u32,
    cutoff_model: bool,
    delay: Duration,
    cursor: &mut usize,
) -> std::result::Result<(u32, bool), Abort> {
    send(
        tx,
        cancel,
        StreamEvent::Delta(BlockDelta::block_start(block_index, BlockKind::Text)),
    )
    .await?;

    let total = if cutoff_model {
        target_words + target_words / 2
    } else {
        target_words
    };

    let mut text = String::new();
    let mut sent = 0u32;
    for _ in 0..total {
        if cutoff_model && sent >= budget {
            break;
        }

        let word = next_word(cursor);
        let delta = format!("{word} ");
        text.push_str(&delta);
        send(
            tx,
            cancel,
            StreamEvent::Delta(BlockDelta::text(block_index, delta)),
        )
        .await?;
        sleep_or_cancel(tx, cancel, delay).await?;
        sent += 1;
    }

    let cut = cutoff_model && sent >= budget;
    send(
        tx,
        cancel,
        StreamEvent::Block(
            Block::text(text.trim_end())
                .with_sequence(block_index)
                .with_source_backend(BackendId::Lorem),
        ),
    )
    .await?;

    Ok((sent, cut))
}

/// Stream one thinking block: words, then the signature as the final delta,
/// matching native reasoning-block ordering.
async fn stream_thinking_block(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    block_index: usize,
    target_words: u32,
    delay: Duration,
    cursor: &mut usize,
) -> std::result::Result<u32, Abort> {
    send(
        tx,
        cancel,
        StreamEvent::Delta(BlockDelta::block_start(block_index, BlockKind::Thinking)),
    )
    .await?;

    let mut text = String::new();
    let mut sent = 0u32;
    for _ in 0..target_words {
        let word = next_word(cursor);
        let delta = format!("{word} ");
        text.push_str(&delta);
        send(
            tx,
            cancel,
            StreamEvent::Delta(BlockDelta::text(block_index, delta)),
        )
        .await?;
        sleep_or_cancel(tx, cancel, delay).await?;
        sent += 1;
    }

    send(
        tx,
        cancel,
        StreamEvent::Delta(BlockDelta::signature(block_index, MOCK_SIGNATURE)),
    )
    .await?;

    send(
        tx,
        cancel,
        StreamEvent::Block(
            Block::thinking(text.trim_end())
                .with_sequence(block_index)
                .with_source_backend(BackendId::Lorem)
                .with_provider_data(json!({ "signature": MOCK_SIGNATURE })),
        ),
    )
    .await?;

    Ok(sent)
}

/// Stream one tool_use block: a call-start delta, then the mock input JSON
/// character by character.
async fn stream_tool_use_block(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    block_index: usize,
    tool: &Tool,
    delay: Duration,
) -> std::result::Result<u32, Abort> {
    let input = mock_tool_input(tool);
    let tool_id = format!("toolu_{}_{}", tool.function.name, block_index);

    send(
        tx,
        cancel,
        StreamEvent::Delta(BlockDelta::tool_call_start(
            block_index,
            &tool_id,
            &tool.function.name,
        )),
    )
    .await?;

    let json_text = serde_json::to_string_pretty(&input).unwrap_or_else(|_| "{}".to_string());
    for ch in json_text.chars() {
        send(
            tx,
            cancel,
            StreamEvent::Delta(BlockDelta::input_json(block_index, ch.to_string())),
        )
        .await?;
        // JSON streams faster than words.
        sleep_or_cancel(tx, cancel, delay / 10).await?;
    }

    send(
        tx,
        cancel,
        StreamEvent::Block(
            Block::tool_use(tool_id, tool.function.name.clone(), input)
                .with_sequence(block_index)
                .with_execution_side(tool.execution_side)
                .with_source_backend(BackendId::Lorem),
        ),
    )
    .await?;

    Ok((json_text.len() / 4) as u32)
}

async fn send(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    event: StreamEvent,
) -> std::result::Result<(), Abort> {
    match send_event(tx, cancel, event).await {
        SendOutcome::Sent => Ok(()),
        SendOutcome::Cancelled | SendOutcome::Closed => Err(Abort),
    }
}

async fn sleep_or_cancel(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    delay: Duration,
) -> std::result::Result<(), Abort> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            send_cancelled(tx).await;
            Err(Abort)
        }
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
