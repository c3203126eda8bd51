//! Tool translation to OpenRouter.
//!
//! The library's tool shape is already the OpenAI function format, so this
//! is mostly a pass-through; `search` is translated as an ordinary function
//! tool because the backend has no portable native search.

use serde_json::json;

use manifold_core::{Error, Result, Tool, ToolChoice, ToolChoiceMode};

use super::wire::{FunctionDefinition, WireTool};

pub fn to_wire_tools(tools: &[Tool]) -> Result<Vec<WireTool>> {
    let mut result = Vec::with_capacity(tools.len());

    for (i, tool) in tools.iter().enumerate() {
        tool.validate().map_err(|err| {
            Error::invalid_request(
                format!("tools[{i}]"),
                format!("{}: {err}", tool.function.name),
            )
        })?;

        result.push(WireTool {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: tool.function.name.clone(),
                description: (!tool.function.description.is_empty())
                    .then(|| tool.function.description.clone()),
                parameters: tool.function.parameters.clone(),
            },
        });
    }

    Ok(result)
}

/// Map tool selection onto the backend's representation: a mode string, or a
/// function object for a specific tool.
pub fn to_wire_tool_choice(choice: &ToolChoice) -> Result<serde_json::Value> {
    choice.validate()?;

    Ok(match choice.mode {
        ToolChoiceMode::Auto => json!("auto"),
        ToolChoiceMode::Required => json!("required"),
        ToolChoiceMode::None => json!("none"),
        ToolChoiceMode::Specific => {
            let name = choice.tool_name.as_deref().unwrap_or_default();
            json!({
                "type": "function",
                "function": { "name": name }
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::tools::builtin;

    #[test]
    fn test_tools_pass_through() {
        let tool = builtin::custom_tool(
            "get_weather",
            "Get the weather",
            json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        )
        .unwrap();
        let wire = to_wire_tools(&[tool]).unwrap();
        assert_eq!(wire[0].kind, "function");
        assert_eq!(wire[0].function.name, "get_weather");
        assert_eq!(wire[0].function.parameters["type"], "object");
    }

    #[test]
    fn test_search_is_a_plain_function_tool() {
        let wire = to_wire_tools(&[builtin::search_tool().unwrap()]).unwrap();
        assert_eq!(wire[0].function.name, "search");
        assert!(wire[0].function.parameters.get("properties").is_some());
    }

    #[test]
    fn test_tool_choice_mapping() {
        assert_eq!(to_wire_tool_choice(&ToolChoice::auto()).unwrap(), json!("auto"));
        assert_eq!(
            to_wire_tool_choice(&ToolChoice::required()).unwrap(),
            json!("required")
        );
        assert_eq!(to_wire_tool_choice(&ToolChoice::none()).unwrap(), json!("none"));
        assert_eq!(
            to_wire_tool_choice(&ToolChoice::specific("bash")).unwrap(),
            json!({"type": "function", "function": {"name": "bash"}})
        );
    }
}
