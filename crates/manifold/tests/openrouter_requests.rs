//! Request-shape tests for the OpenRouter adapter: OpenAI message structure,
//! tool-call encoding, reasoning replay, and cross-backend splitting.

use serde_json::json;

use manifold::providers::openrouter::build_request_debug;
use manifold::{
    BackendId, Block, ExecutionSide, GenerateRequest, Message, RequestParams, Role,
};

fn debug_messages(messages: Vec<Message>) -> serde_json::Value {
    let req = GenerateRequest::new("moonshotai/kimi-k2", messages);
    build_request_debug(&req).unwrap()["messages"].clone()
}

#[test]
fn test_cross_backend_replay_split() {
    // An Anthropic server-side web search replayed here is rewritten into
    // synthetic turns.
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::web_search_use_with_input("srvtoolu_1", "web_search", json!({"query": "answer"}))
                .with_sequence(0)
                .with_execution_side(ExecutionSide::Provider)
                .with_source_backend(BackendId::Anthropic),
            Block::text("Sources: example.com").with_sequence(1),
            Block::text("So the answer is 42.").with_sequence(2),
        ],
    )];
    let messages = debug_messages(conversation);
    let messages = messages.as_array().unwrap();

    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], "assistant");
    assert_eq!(
        messages[0]["content"],
        "I used the web_search tool to help answer your question."
    );
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[1]["content"], "Tool results:\n\nSources: example.com");
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(messages[2]["content"], "So the answer is 42.");
}

#[test]
fn test_tool_results_become_tool_role_messages() {
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::text("checking").with_sequence(0),
            Block::tool_use("call_1", "get_weather", json!({"city": "Oslo"})).with_sequence(1),
            Block::tool_result("call_1", "snowing").with_sequence(2),
        ],
    )];
    let messages = debug_messages(conversation);
    let messages = messages.as_array().unwrap();

    assert_eq!(messages.len(), 2);

    assert_eq!(messages[0]["role"], "assistant");
    assert_eq!(messages[0]["content"], "checking");
    let tool_call = &messages[0]["tool_calls"][0];
    assert_eq!(tool_call["id"], "call_1");
    assert_eq!(tool_call["type"], "function");
    assert_eq!(tool_call["function"]["name"], "get_weather");
    // Arguments travel as a JSON string.
    let arguments: serde_json::Value =
        serde_json::from_str(tool_call["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(arguments, json!({"city": "Oslo"}));

    assert_eq!(messages[1]["role"], "tool");
    assert_eq!(messages[1]["tool_call_id"], "call_1");
    assert_eq!(messages[1]["content"], "snowing");
}

#[test]
fn test_thinking_synthesizes_reasoning_details() {
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::thinking("imported reasoning")
                .with_sequence(0)
                .with_source_backend(BackendId::Anthropic),
            Block::text("result").with_sequence(1),
        ],
    )];
    let messages = debug_messages(conversation);

    let details = messages[0]["reasoning_details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["type"], "reasoning.text");
    assert_eq!(details[0]["text"], "imported reasoning");
}

#[test]
fn test_thinking_replays_original_reasoning_details() {
    // Structured reasoning this backend produced earlier replays verbatim,
    // including entries the normalized form cannot carry.
    let original = json!([
        {"type": "reasoning.text", "text": "step one"},
        {"type": "reasoning.encrypted", "data": "AAAB=="},
    ]);
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::thinking("step one")
                .with_sequence(0)
                .with_source_backend(BackendId::OpenRouter)
                .with_provider_data(original.clone()),
        ],
    )];
    let messages = debug_messages(conversation);

    assert_eq!(messages[0]["reasoning_details"], original);
}

#[test]
fn test_multiple_tool_rounds_alternate() {
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::tool_use("call_A", "bash", json!({"command": "ls"})).with_sequence(0),
            Block::tool_result("call_A", "file.txt").with_sequence(1),
            Block::tool_use("call_B", "bash", json!({"command": "cat file.txt"}))
                .with_sequence(2),
            Block::tool_result("call_B", "lorem").with_sequence(3),
        ],
    )];
    let messages = debug_messages(conversation);
    let roles: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["assistant", "tool", "assistant", "tool"]);
}

#[test]
fn test_tool_error_result_content() {
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::tool_use("call_1", "bash", json!({"command": "explode"})).with_sequence(0),
            Block::tool_error("call_1", "command not found").with_sequence(1),
        ],
    )];
    let messages = debug_messages(conversation);
    assert_eq!(messages[1]["role"], "tool");
    assert_eq!(messages[1]["content"], "command not found");
}

#[test]
fn test_missing_tool_use_id_is_invalid_request() {
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![Block::tool_result("", "orphan").with_sequence(0)],
    )];
    let req = GenerateRequest::new("moonshotai/kimi-k2", conversation);
    let err = build_request_debug(&req).unwrap_err();
    assert!(err.is_invalid_request());
}

#[test]
fn test_tools_and_parallel_flag() {
    let req = GenerateRequest::new("openai/gpt-4o", vec![Message::user("hi")]).with_params(
        RequestParams {
            tools: vec![manifold::tools::builtin::bash_tool().unwrap()],
            parallel_tool_calls: Some(false),
            ..Default::default()
        },
    );
    let value = build_request_debug(&req).unwrap();
    assert_eq!(value["tools"][0]["type"], "function");
    assert_eq!(value["tools"][0]["function"]["name"], "bash");
    assert_eq!(value["parallel_tool_calls"], false);
}
