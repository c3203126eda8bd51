//! Backend identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies an upstream LLM service.
///
/// Using a typed identifier instead of free-form strings prevents typos and
/// lets block provenance checks (`Block::is_from_backend`) stay exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    /// Anthropic's Claude messages API.
    Anthropic,
    /// OpenRouter's OpenAI-compatible aggregation API.
    OpenRouter,
    /// The mock lorem-ipsum backend used for testing and development.
    Lorem,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenRouter => "openrouter",
            Self::Lorem => "lorem",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic" => Ok(Self::Anthropic),
            "openrouter" => Ok(Self::OpenRouter),
            "lorem" => Ok(Self::Lorem),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for id in [BackendId::Anthropic, BackendId::OpenRouter, BackendId::Lorem] {
            assert_eq!(id.as_str().parse::<BackendId>().unwrap(), id);
        }
    }

    #[test]
    fn test_unknown_backend() {
        assert!("gemini".parse::<BackendId>().is_err());
    }
}
