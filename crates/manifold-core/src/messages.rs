//! Normalized conversation representation: messages, blocks, deltas,
//! citations.

pub mod block;
pub mod citation;
pub mod delta;

use serde::{Deserialize, Serialize};

pub use block::{Block, BlockData, BlockKind, ExecutionSide, SearchResult};
pub use citation::Citation;
pub use delta::{BlockDelta, DeltaPayload};

/// Conversation role. Role alternation is not a model invariant; it is
/// enforced at the adapter boundary where each backend requires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single conversation message: a role plus an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub blocks: Vec<Block>,
}

impl Message {
    pub fn new(role: Role, blocks: Vec<Block>) -> Self {
        Self { role, blocks }
    }

    /// A user message holding a single text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Block::text(text)])
    }

    /// An assistant message holding a single text block.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Block::text(text)])
    }

    /// Renumber block sequences into the strict prefix 0..n-1.
    pub fn resequence(mut self) -> Self {
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.sequence = i;
        }
        self
    }
}
