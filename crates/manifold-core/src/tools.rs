//! Function-style tool descriptors and selection.

pub mod builtin;
pub mod registry;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::messages::ExecutionSide;

pub use builtin::{bash_tool, custom_tool, custom_tool_with_side, search_tool, text_editor_tool, tool_by_name};
pub use registry::{ToolDefinition, ToolRegistry, create_tool, register_tool};

/// Canonical names of the built-in tools.
pub const TOOL_SEARCH: &str = "search";
pub const TOOL_TEXT_EDITOR: &str = "text_editor";
pub const TOOL_BASH: &str = "bash";

/// The function definition inside a tool, in the universal OpenAI shape.
/// Adapters rename and flatten as their backend requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// JSON schema for the function's parameters; the root must be an
    /// `"object"` schema.
    pub parameters: serde_json::Value,
}

/// A function tool the model can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Always "function".
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunction,
    /// Where the tool executes. Attached orthogonally and never serialized to
    /// backends; they derive it from tool identity.
    #[serde(skip)]
    pub execution_side: ExecutionSide,
}

impl Tool {
    pub fn validate(&self) -> Result<()> {
        if self.kind != "function" {
            return Err(Error::invalid_value(
                "tool.type",
                self.kind.clone(),
                "only 'function' tools are supported",
            ));
        }
        if self.function.name.is_empty() {
            return Err(Error::invalid_request("tool.function.name", "function name is required"));
        }
        let root_type = self
            .function
            .parameters
            .as_object()
            .and_then(|o| o.get("type"))
            .and_then(|t| t.as_str());
        if root_type != Some("object") {
            return Err(Error::invalid_value(
                "tool.function.parameters",
                self.function.parameters.clone(),
                "parameters must be a JSON schema with type 'object'",
            ));
        }
        Ok(())
    }
}

/// Tool selection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoiceMode {
    /// The model decides whether to use tools.
    Auto,
    /// The model must use some tool.
    Required,
    /// The model may not use tools.
    None,
    /// The model must use one named tool.
    Specific,
}

/// Which tool(s) the model may or must call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChoice {
    pub mode: ToolChoiceMode,
    /// Required when `mode` is `Specific`; forbidden otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ToolChoice {
    pub fn auto() -> Self {
        Self {
            mode: ToolChoiceMode::Auto,
            tool_name: None,
        }
    }

    pub fn required() -> Self {
        Self {
            mode: ToolChoiceMode::Required,
            tool_name: None,
        }
    }

    pub fn none() -> Self {
        Self {
            mode: ToolChoiceMode::None,
            tool_name: None,
        }
    }

    pub fn specific(tool_name: impl Into<String>) -> Self {
        Self {
            mode: ToolChoiceMode::Specific,
            tool_name: Some(tool_name.into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.mode, &self.tool_name) {
            (ToolChoiceMode::Specific, Some(name)) if !name.is_empty() => Ok(()),
            (ToolChoiceMode::Specific, _) => Err(Error::invalid_request(
                "tool_choice.tool_name",
                "tool_name is required when mode is 'specific'",
            )),
            (_, Some(_)) => Err(Error::invalid_request(
                "tool_choice.tool_name",
                "tool_name is only allowed when mode is 'specific'",
            )),
            (_, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_tool() -> Tool {
        Tool {
            kind: "function".to_string(),
            function: ToolFunction {
                name: "lookup".to_string(),
                description: "Look something up".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            },
            execution_side: ExecutionSide::Server,
        }
    }

    #[test]
    fn test_valid_tool() {
        assert!(valid_tool().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_function_kind() {
        let mut tool = valid_tool();
        tool.kind = "retrieval".to_string();
        assert!(tool.validate().is_err());
    }

    #[test]
    fn test_rejects_missing_name() {
        let mut tool = valid_tool();
        tool.function.name.clear();
        assert!(tool.validate().is_err());
    }

    #[test]
    fn test_rejects_non_object_schema() {
        let mut tool = valid_tool();
        tool.function.parameters = json!({"type": "string"});
        assert!(tool.validate().is_err());
        tool.function.parameters = json!("not a schema");
        assert!(tool.validate().is_err());
    }

    #[test]
    fn test_execution_side_not_serialized() {
        let value = serde_json::to_value(valid_tool()).unwrap();
        assert!(value.get("execution_side").is_none());
        assert_eq!(value["type"], "function");
    }

    #[test]
    fn test_tool_choice_specific_requires_name() {
        assert!(ToolChoice::specific("bash").validate().is_ok());
        let missing = ToolChoice {
            mode: ToolChoiceMode::Specific,
            tool_name: None,
        };
        assert!(missing.validate().is_err());
        let empty = ToolChoice {
            mode: ToolChoiceMode::Specific,
            tool_name: Some(String::new()),
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_tool_choice_other_modes_forbid_name() {
        let choice = ToolChoice {
            mode: ToolChoiceMode::Auto,
            tool_name: Some("bash".to_string()),
        };
        assert!(choice.validate().is_err());
        assert!(ToolChoice::auto().validate().is_ok());
        assert!(ToolChoice::required().validate().is_ok());
        assert!(ToolChoice::none().validate().is_ok());
    }
}
