//! Source citations attached to text blocks.

use serde::{Deserialize, Serialize};

/// A reference from generated text back to its source material.
///
/// Backends report citations in very different shapes (web search locations,
/// character ranges into documents, result indexes); this type is the union of
/// the fields the library normalizes. Backend-only fields such as Anthropic's
/// `encrypted_index` live in `provider_data`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Citation {
    /// Citation kind as reported by the backend, e.g. `url_citation`,
    /// `web_search_result_location`, `char_location`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Start offset into the text block this citation annotates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    /// End offset into the text block this citation annotates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
    /// The quoted source text, when the backend provides it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cited_text: Option<String>,
    /// Index into a search-result list, for result-location citations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_index: Option<usize>,
    /// Opaque backend-private citation payload, preserved for replay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<serde_json::Value>,
}

impl Citation {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }
}
