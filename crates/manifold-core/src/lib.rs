//! manifold-core — shared types for the manifold LLM runtime.
//!
//! This crate provides:
//! - The normalized conversation model: messages, typed content blocks,
//!   streaming deltas, citations
//! - The [`Provider`] contract that every backend implements
//! - Tool descriptors, built-in tool factories, and the runtime tool registry
//! - The error taxonomy with retryability classification
//! - The cross-backend tool splitter used by every adapter
//! - The capability catalog and the advisory validation engine
//!
//! # Architecture
//!
//! Backends live in the `manifold` crate; this crate holds everything they
//! share:
//!
//! - **Content layer** ([`messages`]): blocks are tagged variants, one struct
//!   per kind, with an opaque `provider_data` bag preserving each backend's
//!   original serialization for byte-faithful same-backend replay.
//! - **Streaming layer** ([`streaming`]): one bounded event channel per call,
//!   carrying deltas, assembled blocks, and exactly one terminator.
//! - **Advisory layer** ([`capabilities`], [`validation`]): read-only model
//!   metadata and non-blocking warnings; backend APIs stay the source of
//!   truth.

pub mod backend;
pub mod capabilities;
pub mod error;
pub mod messages;
pub mod provider;
pub mod request;
pub mod response;
pub mod splitter;
pub mod streaming;
pub mod tools;
pub mod validation;

pub use backend::BackendId;
pub use error::{Error, ErrorCode, Result};
pub use messages::{
    Block, BlockData, BlockDelta, BlockKind, Citation, DeltaPayload, ExecutionSide, Message, Role,
    SearchResult,
};
pub use provider::Provider;
pub use request::{GenerateRequest, RequestParams};
pub use response::GenerateResponse;
pub use splitter::split_messages_at_cross_backend_tool;
pub use streaming::{
    EVENT_CHANNEL_CAPACITY, EventStream, StreamEvent, StreamMetadata, normalize_stop_reason,
};
pub use tools::{TOOL_BASH, TOOL_SEARCH, TOOL_TEXT_EDITOR, Tool, ToolChoice, ToolChoiceMode, ToolFunction};
pub use validation::{Severity, ValidationWarning, WarningCode, validate};

// Re-export the cancellation token so callers don't need a direct
// tokio-util dependency to drive the provider contract.
pub use tokio_util::sync::CancellationToken;
