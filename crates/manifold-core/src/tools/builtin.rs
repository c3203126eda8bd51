//! Built-in tool factories.
//!
//! Tools are defined once in the universal function shape; each adapter
//! translates them to its backend's native representation (Anthropic swaps
//! `search` for its server-side web search, OpenRouter passes the schema
//! through).

use serde_json::json;

use crate::error::{Error, Result};
use crate::messages::ExecutionSide;
use crate::tools::{TOOL_BASH, TOOL_SEARCH, TOOL_TEXT_EDITOR, Tool, ToolFunction};

/// Web search. Provider-side by default: backends with a native search tool
/// run it themselves and return results inline.
pub fn search_tool() -> Result<Tool> {
    let tool = Tool {
        kind: "function".to_string(),
        function: ToolFunction {
            name: TOOL_SEARCH.to_string(),
            description: "Search the web for current information".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        },
        execution_side: ExecutionSide::Provider,
    };
    tool.validate()?;
    Ok(tool)
}

/// File editing, executed by the consuming backend.
pub fn text_editor_tool() -> Result<Tool> {
    let tool = Tool {
        kind: "function".to_string(),
        function: ToolFunction {
            name: TOOL_TEXT_EDITOR.to_string(),
            description: "Edit text files".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to edit"
                    },
                    "command": {
                        "type": "string",
                        "description": "Editor command to execute"
                    }
                },
                "required": ["path", "command"]
            }),
        },
        execution_side: ExecutionSide::Server,
    };
    tool.validate()?;
    Ok(tool)
}

/// Shell command execution, executed by the consuming backend.
pub fn bash_tool() -> Result<Tool> {
    let tool = Tool {
        kind: "function".to_string(),
        function: ToolFunction {
            name: TOOL_BASH.to_string(),
            description: "Execute bash commands".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The bash command to execute"
                    }
                },
                "required": ["command"]
            }),
        },
        execution_side: ExecutionSide::Server,
    };
    tool.validate()?;
    Ok(tool)
}

/// An arbitrary function tool with server-side execution.
pub fn custom_tool(
    name: impl Into<String>,
    description: impl Into<String>,
    parameters: serde_json::Value,
) -> Result<Tool> {
    custom_tool_with_side(name, description, parameters, ExecutionSide::Server)
}

/// An arbitrary function tool with an explicit execution side.
pub fn custom_tool_with_side(
    name: impl Into<String>,
    description: impl Into<String>,
    parameters: serde_json::Value,
    execution_side: ExecutionSide,
) -> Result<Tool> {
    let name = name.into();
    let description = description.into();
    if name.is_empty() {
        return Err(Error::invalid_request("tool.function.name", "tool name is required"));
    }
    if description.is_empty() {
        return Err(Error::invalid_request(
            "tool.function.description",
            "tool description is required",
        ));
    }
    if parameters.is_null() {
        return Err(Error::invalid_request(
            "tool.function.parameters",
            "parameters are required",
        ));
    }

    let tool = Tool {
        kind: "function".to_string(),
        function: ToolFunction {
            name,
            description,
            parameters,
        },
        execution_side,
    };
    tool.validate()?;
    Ok(tool)
}

/// Create a built-in tool from a caller-friendly name.
///
/// Aliases: `web_search` → search, `file_edit` → text_editor,
/// `code_exec` → bash.
pub fn tool_by_name(name: &str) -> Result<Tool> {
    match name {
        "search" | "web_search" => search_tool(),
        "text_editor" | "file_edit" => text_editor_tool(),
        "bash" | "code_exec" => bash_tool(),
        other => Err(Error::invalid_value(
            "tool",
            other,
            "unknown built-in tool",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_in_sides() {
        assert_eq!(search_tool().unwrap().execution_side, ExecutionSide::Provider);
        assert_eq!(text_editor_tool().unwrap().execution_side, ExecutionSide::Server);
        assert_eq!(bash_tool().unwrap().execution_side, ExecutionSide::Server);
    }

    #[test]
    fn test_aliases() {
        assert_eq!(tool_by_name("web_search").unwrap().function.name, "search");
        assert_eq!(tool_by_name("file_edit").unwrap().function.name, "text_editor");
        assert_eq!(tool_by_name("code_exec").unwrap().function.name, "bash");
        assert!(tool_by_name("teleport").is_err());
    }

    #[test]
    fn test_custom_tool_validation() {
        let params = serde_json::json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        });
        let tool = custom_tool("get_weather", "Get the weather", params.clone()).unwrap();
        assert_eq!(tool.execution_side, ExecutionSide::Server);

        assert!(custom_tool("", "desc", params.clone()).is_err());
        assert!(custom_tool("name", "", params.clone()).is_err());
        assert!(custom_tool("name", "desc", serde_json::Value::Null).is_err());
        assert!(custom_tool("name", "desc", serde_json::json!({"type": "array"})).is_err());
    }

    #[test]
    fn test_custom_tool_with_client_side() {
        let params = serde_json::json!({"type": "object", "properties": {}});
        let tool =
            custom_tool_with_side("notify", "Notify the user", params, ExecutionSide::Client)
                .unwrap();
        assert_eq!(tool.execution_side, ExecutionSide::Client);
    }
}
