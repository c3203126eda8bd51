//! Streaming deltas.
//!
//! A [`BlockDelta`] is an ephemeral incremental contribution to a block being
//! streamed. Deltas are never persisted; consumers accumulate them and the
//! aggregator emits the assembled [`Block`](crate::Block) when the block
//! completes.

use serde::{Deserialize, Serialize};

use crate::messages::block::BlockKind;

/// The content of one delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "delta_kind", rename_all = "snake_case")]
pub enum DeltaPayload {
    /// Incremental text for text and thinking blocks. Block-start deltas for
    /// these kinds carry an empty string.
    Text { text: String },
    /// Reasoning signature fragment; arrives last in a native thinking block.
    Signature { signature: String },
    /// Incremental JSON for a tool call's input.
    InputJson { partial_json: String },
    /// A new tool call opened with its identity.
    ToolCallStart { id: String, name: String },
    /// Token usage reported mid-stream.
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
}

/// An incremental update to the block at `block_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDelta {
    /// Which block this delta belongs to; matches the completed block's
    /// `sequence`.
    pub block_index: usize,
    /// Set only on the first delta of a block; later deltas carry the same
    /// implied kind until the block's completion event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_kind: Option<BlockKind>,
    #[serde(flatten)]
    pub payload: DeltaPayload,
}

impl BlockDelta {
    /// Block-start delta for a text or thinking block.
    pub fn block_start(block_index: usize, kind: BlockKind) -> Self {
        Self {
            block_index,
            block_kind: Some(kind),
            payload: DeltaPayload::Text {
                text: String::new(),
            },
        }
    }

    pub fn text(block_index: usize, text: impl Into<String>) -> Self {
        Self {
            block_index,
            block_kind: None,
            payload: DeltaPayload::Text { text: text.into() },
        }
    }

    pub fn signature(block_index: usize, signature: impl Into<String>) -> Self {
        Self {
            block_index,
            block_kind: None,
            payload: DeltaPayload::Signature {
                signature: signature.into(),
            },
        }
    }

    pub fn input_json(block_index: usize, partial_json: impl Into<String>) -> Self {
        Self {
            block_index,
            block_kind: None,
            payload: DeltaPayload::InputJson {
                partial_json: partial_json.into(),
            },
        }
    }

    pub fn tool_call_start(
        block_index: usize,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            block_index,
            block_kind: Some(BlockKind::ToolUse),
            payload: DeltaPayload::ToolCallStart {
                id: id.into(),
                name: name.into(),
            },
        }
    }

    pub fn usage(block_index: usize, input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            block_index,
            block_kind: None,
            payload: DeltaPayload::Usage {
                input_tokens,
                output_tokens,
            },
        }
    }

    /// True when this delta opens a new block.
    pub fn is_block_start(&self) -> bool {
        self.block_kind.is_some()
    }

    pub fn text_delta(&self) -> Option<&str> {
        match &self.payload {
            DeltaPayload::Text { text } if !text.is_empty() => Some(text),
            _ => None,
        }
    }

    pub fn json_delta(&self) -> Option<&str> {
        match &self.payload {
            DeltaPayload::InputJson { partial_json } => Some(partial_json),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_start_carries_kind() {
        let delta = BlockDelta::block_start(0, BlockKind::Thinking);
        assert!(delta.is_block_start());
        assert_eq!(delta.block_kind, Some(BlockKind::Thinking));
        assert!(delta.text_delta().is_none());
    }

    #[test]
    fn test_tool_call_start_is_block_start() {
        let delta = BlockDelta::tool_call_start(2, "toolu_1", "bash");
        assert!(delta.is_block_start());
        assert_eq!(delta.block_kind, Some(BlockKind::ToolUse));
    }

    #[test]
    fn test_continuation_deltas_have_no_kind() {
        assert!(!BlockDelta::text(0, "hello").is_block_start());
        assert!(!BlockDelta::input_json(1, "{\"q\":").is_block_start());
        assert_eq!(BlockDelta::text(0, "hello").text_delta(), Some("hello"));
    }
}
