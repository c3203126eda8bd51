//! Tool translation to the Anthropic API.
//!
//! Built-in tools map to the backend's versioned native tools; everything
//! else becomes a standard custom tool with `input_schema`.

use serde_json::json;

use manifold_core::{
    Error, Result, TOOL_BASH, TOOL_SEARCH, TOOL_TEXT_EDITOR, Tool, ToolChoice, ToolChoiceMode,
};

pub fn to_wire_tools(tools: &[Tool]) -> Result<Vec<serde_json::Value>> {
    let mut result = Vec::with_capacity(tools.len());

    for (i, tool) in tools.iter().enumerate() {
        let wire = match tool.function.name.as_str() {
            TOOL_SEARCH => json!({
                "type": "web_search_20250305",
                "name": "web_search",
            }),
            TOOL_TEXT_EDITOR => json!({
                "type": "text_editor_20250728",
                "name": "str_replace_based_edit_tool",
            }),
            TOOL_BASH => json!({
                "type": "bash_20250124",
                "name": "bash",
            }),
            _ => custom_tool(tool)
                .map_err(|err| Error::invalid_request(
                    format!("tools[{i}]"),
                    format!("{}: {err}", tool.function.name),
                ))?,
        };
        result.push(wire);
    }

    Ok(result)
}

fn custom_tool(tool: &Tool) -> Result<serde_json::Value> {
    tool.validate()?;

    let mut wire = json!({
        "name": tool.function.name,
        "input_schema": tool.function.parameters,
    });
    if !tool.function.description.is_empty() {
        wire["description"] = json!(tool.function.description);
    }
    Ok(wire)
}

/// Map tool selection onto the backend's representation. `Required` is
/// spelled "any" here.
pub fn to_wire_tool_choice(choice: &ToolChoice) -> Result<serde_json::Value> {
    choice.validate()?;

    Ok(match choice.mode {
        ToolChoiceMode::Auto => json!({ "type": "auto" }),
        ToolChoiceMode::Required => json!({ "type": "any" }),
        ToolChoiceMode::None => json!({ "type": "none" }),
        ToolChoiceMode::Specific => {
            let name = choice.tool_name.as_deref().unwrap_or_default();
            json!({ "type": "tool", "name": name })
        }
    })
}
