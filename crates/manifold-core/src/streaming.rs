//! Uniform streaming events.
//!
//! Every backend stream is aggregated into one finite, totally ordered
//! sequence of [`StreamEvent`]s: fine-grained deltas for UI, assembled
//! complete blocks for persistence, and exactly one terminal event —
//! [`StreamEvent::Metadata`] on success or [`StreamEvent::Error`] otherwise.

use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Error;
use crate::messages::{Block, BlockDelta};

/// Capacity of the per-stream event channel. Producers block on send when the
/// consumer lags; a slow consumer therefore slows reads from the upstream.
pub const EVENT_CHANNEL_CAPACITY: usize = 10;

/// One element of a streaming response.
#[derive(Debug)]
pub enum StreamEvent {
    /// Incremental block content for real-time display.
    Delta(BlockDelta),
    /// A block finished streaming; normalized and ready for persistence.
    Block(Block),
    /// Final completion data; always the last event of a successful stream.
    Metadata(StreamMetadata),
    /// Terminal failure; always the last event of a failed stream.
    Error(Error),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Metadata(_) | Self::Error(_))
    }

    pub fn as_delta(&self) -> Option<&BlockDelta> {
        match self {
            Self::Delta(delta) => Some(delta),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Self::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_metadata(&self) -> Option<&StreamMetadata> {
        match self {
            Self::Metadata(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Completion information sent as the final event of a successful stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Normalized stop reason; see [`normalize_stop_reason`].
    pub stop_reason: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub response_metadata: serde_json::Map<String, serde_json::Value>,
}

/// The caller-visible event sequence for one `stream` call.
pub type EventStream = ReceiverStream<StreamEvent>;

/// Map a backend's finish/stop reason onto the library's vocabulary.
/// Unknown values pass through verbatim.
pub fn normalize_stop_reason(raw: &str) -> String {
    match raw {
        "stop" | "end_turn" => "end_turn",
        "length" | "max_tokens" => "max_tokens",
        "tool_calls" | "tool_use" => "tool_use",
        "content_filter" | "stop_sequence" => "stop_sequence",
        other => other,
    }
    .to_string()
}
