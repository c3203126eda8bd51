//! The normalized content block.
//!
//! A [`Block`] is one unit of message content: text, reasoning, a tool call,
//! a tool result, media, or a server-side web search exchange. Blocks are
//! immutable after creation; assistant blocks are produced by the adapters
//! and aggregators on the way out of an LLM, user blocks by the caller.

use serde::{Deserialize, Serialize};

use crate::backend::BackendId;
use crate::messages::citation::Citation;

/// Which party runs a tool: the upstream LLM service itself (`Provider`),
/// the library's consumer backend (`Server`), or the end caller (`Client`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSide {
    Provider,
    Server,
    Client,
}

impl Default for ExecutionSide {
    /// Tools execute on the consuming backend unless declared otherwise.
    fn default() -> Self {
        Self::Server
    }
}

/// Fieldless discriminant for [`BlockData`], used by deltas and predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Thinking,
    ToolUse,
    ToolResult,
    Image,
    Document,
    WebSearchUse,
    WebSearchResult,
}

/// One entry of a server-side web search result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_age: Option<String>,
}

/// Kind-specific block payload. One variant per block kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockData {
    Text {
        text: String,
    },
    /// Model reasoning. A backend signature, when present, lives in the
    /// block's `provider_data`, not here.
    Thinking {
        text: String,
    },
    ToolUse {
        tool_use_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        is_error: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Image {
        url: String,
        mime_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alt_text: Option<String>,
    },
    Document {
        #[serde(skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_uri: Option<String>,
        mime_type: String,
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    WebSearchUse {
        tool_use_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    /// Server-side web search outcome: either a result list or an error code.
    WebSearchResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        results: Vec<SearchResult>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
}

impl BlockData {
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Text { .. } => BlockKind::Text,
            Self::Thinking { .. } => BlockKind::Thinking,
            Self::ToolUse { .. } => BlockKind::ToolUse,
            Self::ToolResult { .. } => BlockKind::ToolResult,
            Self::Image { .. } => BlockKind::Image,
            Self::Document { .. } => BlockKind::Document,
            Self::WebSearchUse { .. } => BlockKind::WebSearchUse,
            Self::WebSearchResult { .. } => BlockKind::WebSearchResult,
        }
    }
}

/// A normalized content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Position of this block in its message, 0-indexed. Assigned by whatever
    /// produced the block and never mutated afterwards.
    pub sequence: usize,
    #[serde(flatten)]
    pub data: BlockData,
    /// Where the tool runs; meaningful only for tool_use and web_search_use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_side: Option<ExecutionSide>,
    /// Backend that produced this block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_backend: Option<BackendId>,
    /// Opaque original backend serialization, populated only when the
    /// normalized shape would lose information (encrypted search content,
    /// cryptographic reasoning signatures). Present implies `source_backend`
    /// is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

impl Block {
    fn new(data: BlockData) -> Self {
        Self {
            sequence: 0,
            data,
            execution_side: None,
            source_backend: None,
            provider_data: None,
            citations: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(BlockData::Text { text: text.into() })
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self::new(BlockData::Thinking { text: text.into() })
    }

    pub fn tool_use(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::new(BlockData::ToolUse {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            input,
        })
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(BlockData::ToolResult {
            tool_use_id: tool_use_id.into(),
            is_error: false,
            content: Some(content.into()),
            result: None,
            error: None,
        })
    }

    pub fn tool_error(tool_use_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(BlockData::ToolResult {
            tool_use_id: tool_use_id.into(),
            is_error: true,
            content: None,
            result: None,
            error: Some(error.into()),
        })
    }

    pub fn image(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::new(BlockData::Image {
            url: url.into(),
            mime_type: mime_type.into(),
            alt_text: None,
        })
    }

    pub fn document(title: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::new(BlockData::Document {
            file_id: None,
            file_uri: None,
            mime_type: mime_type.into(),
            title: title.into(),
            context: None,
        })
    }

    pub fn web_search_use(tool_use_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(BlockData::WebSearchUse {
            tool_use_id: tool_use_id.into(),
            tool_name: "web_search".to_string(),
            input: serde_json::json!({ "query": query.into() }),
        })
    }

    /// A web-search invocation with the backend's exact tool name and input.
    pub fn web_search_use_with_input(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::new(BlockData::WebSearchUse {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            input,
        })
    }

    pub fn web_search_result(tool_use_id: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self::new(BlockData::WebSearchResult {
            tool_use_id: tool_use_id.into(),
            results,
            error_code: None,
        })
    }

    pub fn web_search_error(tool_use_id: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self::new(BlockData::WebSearchResult {
            tool_use_id: tool_use_id.into(),
            results: Vec::new(),
            error_code: Some(error_code.into()),
        })
    }

    pub fn with_sequence(mut self, sequence: usize) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_execution_side(mut self, side: ExecutionSide) -> Self {
        self.execution_side = Some(side);
        self
    }

    pub fn with_source_backend(mut self, backend: BackendId) -> Self {
        self.source_backend = Some(backend);
        self
    }

    pub fn with_provider_data(mut self, data: serde_json::Value) -> Self {
        self.provider_data = Some(data);
        self
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn kind(&self) -> BlockKind {
        self.data.kind()
    }

    /// Text payload of text and thinking blocks.
    pub fn text_content(&self) -> Option<&str> {
        match &self.data {
            BlockData::Text { text } | BlockData::Thinking { text } => Some(text),
            _ => None,
        }
    }

    /// Tool-use identifier carried by tool and web-search blocks.
    pub fn tool_use_id(&self) -> Option<&str> {
        match &self.data {
            BlockData::ToolUse { tool_use_id, .. }
            | BlockData::ToolResult { tool_use_id, .. }
            | BlockData::WebSearchUse { tool_use_id, .. }
            | BlockData::WebSearchResult { tool_use_id, .. } => Some(tool_use_id),
            _ => None,
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        match &self.data {
            BlockData::ToolUse { tool_name, .. } | BlockData::WebSearchUse { tool_name, .. } => {
                Some(tool_name)
            }
            _ => None,
        }
    }

    pub fn tool_input(&self) -> Option<&serde_json::Value> {
        match &self.data {
            BlockData::ToolUse { input, .. } | BlockData::WebSearchUse { input, .. } => Some(input),
            _ => None,
        }
    }

    /// True for kinds that can appear in a user turn.
    ///
    /// `tool_result` counts: a user turn is how tool results are replayed to
    /// every backend, so the richer definition is the one the adapters rely on.
    pub fn is_user_kind(&self) -> bool {
        matches!(
            self.kind(),
            BlockKind::Text | BlockKind::Image | BlockKind::Document | BlockKind::ToolResult
        )
    }

    /// True for kinds that can appear in an assistant turn.
    pub fn is_assistant_kind(&self) -> bool {
        matches!(
            self.kind(),
            BlockKind::Text | BlockKind::Thinking | BlockKind::ToolUse
        )
    }

    pub fn is_tool_kind(&self) -> bool {
        matches!(self.kind(), BlockKind::ToolUse | BlockKind::ToolResult)
    }

    pub fn is_tool_use(&self) -> bool {
        self.kind() == BlockKind::ToolUse
    }

    pub fn is_tool_result(&self) -> bool {
        self.kind() == BlockKind::ToolResult
    }

    /// True when this block is a tool invocation the backend executed itself.
    pub fn is_provider_side_tool(&self) -> bool {
        matches!(self.kind(), BlockKind::ToolUse | BlockKind::WebSearchUse)
            && self.execution_side == Some(ExecutionSide::Provider)
    }

    pub fn is_from_backend(&self, backend: BackendId) -> bool {
        self.source_backend == Some(backend)
    }

    pub fn is_from_different_backend(&self, backend: BackendId) -> bool {
        matches!(self.source_backend, Some(b) if b != backend)
    }

    pub fn has_provider_data(&self) -> bool {
        self.provider_data.is_some()
    }

    /// Whether this block can be replayed to `target`.
    ///
    /// Non-tool blocks always replay; client- and server-side tool blocks
    /// always replay; provider-side tool blocks replay only to the backend
    /// that ran them.
    pub fn can_replay_to(&self, target: BackendId) -> bool {
        if !self.is_provider_side_tool() {
            return true;
        }
        self.source_backend == Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_predicates() {
        assert!(Block::text("hi").is_user_kind());
        assert!(Block::text("hi").is_assistant_kind());
        assert!(Block::thinking("hmm").is_assistant_kind());
        assert!(!Block::thinking("hmm").is_user_kind());
        assert!(Block::image("https://x/img.png", "image/png").is_user_kind());
        assert!(Block::document("notes", "application/pdf").is_user_kind());
    }

    #[test]
    fn test_tool_result_is_user_kind() {
        // The richer definition: tool results ride in user turns.
        let block = Block::tool_result("toolu_1", "42");
        assert!(block.is_user_kind());
        assert!(block.is_tool_kind());
        assert!(!block.is_assistant_kind());
    }

    #[test]
    fn test_tool_accessors() {
        let block = Block::tool_use("toolu_1", "bash", json!({"command": "ls"}));
        assert_eq!(block.tool_use_id(), Some("toolu_1"));
        assert_eq!(block.tool_name(), Some("bash"));
        assert_eq!(block.tool_input().unwrap()["command"], "ls");
        assert!(block.text_content().is_none());
    }

    #[test]
    fn test_provider_side_tool_detection() {
        let block = Block::tool_use("id", "web_search", json!({"query": "rust"}))
            .with_execution_side(ExecutionSide::Provider)
            .with_source_backend(BackendId::Anthropic);
        assert!(block.is_provider_side_tool());

        let server = Block::tool_use("id", "bash", json!({}))
            .with_execution_side(ExecutionSide::Server);
        assert!(!server.is_provider_side_tool());
    }

    #[test]
    fn test_can_replay_to() {
        let provider_tool = Block::web_search_use("id", "rust streams")
            .with_execution_side(ExecutionSide::Provider)
            .with_source_backend(BackendId::Anthropic);
        assert!(provider_tool.can_replay_to(BackendId::Anthropic));
        assert!(!provider_tool.can_replay_to(BackendId::OpenRouter));

        // Non-tool blocks and client/server tools replay anywhere.
        assert!(Block::text("hi").can_replay_to(BackendId::OpenRouter));
        let client_tool = Block::tool_use("id", "bash", json!({}))
            .with_execution_side(ExecutionSide::Client)
            .with_source_backend(BackendId::OpenRouter);
        assert!(client_tool.can_replay_to(BackendId::Anthropic));
    }

    #[test]
    fn test_backend_provenance() {
        let block = Block::text("from claude").with_source_backend(BackendId::Anthropic);
        assert!(block.is_from_backend(BackendId::Anthropic));
        assert!(block.is_from_different_backend(BackendId::OpenRouter));
        assert!(!Block::text("local").is_from_different_backend(BackendId::OpenRouter));
    }

    #[test]
    fn test_serialization_shape() {
        let block = Block::tool_use("toolu_1", "search", json!({"query": "x"}))
            .with_sequence(2)
            .with_execution_side(ExecutionSide::Provider);
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["kind"], "tool_use");
        assert_eq!(value["sequence"], 2);
        assert_eq!(value["tool_use_id"], "toolu_1");
        assert_eq!(value["execution_side"], "provider");
        assert!(value.get("provider_data").is_none());
    }
}
