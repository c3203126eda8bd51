//! Request-shape tests for the Anthropic adapter, driven through the debug
//! request builder: cross-backend splitting, tool-result alternation, ID
//! sanitization, thinking and web-search replay.

use serde_json::json;

use manifold::providers::anthropic::build_request_debug;
use manifold::{
    BackendId, Block, ExecutionSide, GenerateRequest, Message, RequestParams, Role,
};

fn debug_messages(messages: Vec<Message>) -> serde_json::Value {
    let req = GenerateRequest::new("claude-sonnet-4-5", messages);
    build_request_debug(&req).unwrap()["messages"].clone()
}

#[test]
fn test_cross_backend_replay_split() {
    // An OpenRouter-executed web search replayed to Anthropic is rewritten
    // into synthetic turns.
    let conversation = vec![
        Message::user("What is the answer?"),
        Message::new(
            Role::Assistant,
            vec![
                Block::tool_use("websearch_1", "web_search", json!({"query": "answer"}))
                    .with_sequence(0)
                    .with_execution_side(ExecutionSide::Provider)
                    .with_source_backend(BackendId::OpenRouter),
                Block::text("Sources: example.com says 42").with_sequence(1),
                Block::text("So the answer is 42.").with_sequence(2),
            ],
        ),
    ];
    let messages = debug_messages(conversation);

    assert_eq!(messages.as_array().unwrap().len(), 4);
    assert_eq!(messages[0]["role"], "user");

    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(
        messages[1]["content"][0]["text"],
        "I used the web_search tool to help answer your question."
    );

    assert_eq!(messages[2]["role"], "user");
    assert_eq!(
        messages[2]["content"][0]["text"],
        "Tool results:\n\nSources: example.com says 42"
    );

    assert_eq!(messages[3]["role"], "assistant");
    assert_eq!(messages[3]["content"][0]["text"], "So the answer is 42.");
}

#[test]
fn test_tool_continuation_alternation() {
    // One flat assistant turn with two tool rounds becomes four properly
    // alternating messages with block counts 1, 1, 2, 1.
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::tool_use("toolu_A", "bash", json!({"command": "ls"})).with_sequence(0),
            Block::tool_result("toolu_A", "file.txt").with_sequence(1),
            Block::thinking("one more step").with_sequence(2),
            Block::tool_use("toolu_B", "bash", json!({"command": "cat file.txt"}))
                .with_sequence(3),
            Block::tool_result("toolu_B", "lorem ipsum").with_sequence(4),
        ],
    )];
    let messages = debug_messages(conversation);
    let messages = messages.as_array().unwrap();

    assert_eq!(messages.len(), 4);
    let roles: Vec<&str> = messages
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["assistant", "user", "assistant", "user"]);

    let counts: Vec<usize> = messages
        .iter()
        .map(|m| m["content"].as_array().unwrap().len())
        .collect();
    assert_eq!(counts, vec![1, 1, 2, 1]);

    // Each tool_use is immediately followed by its result.
    assert_eq!(messages[0]["content"][0]["type"], "tool_use");
    assert_eq!(messages[1]["content"][0]["type"], "tool_result");
    assert_eq!(messages[1]["content"][0]["tool_use_id"], "toolu_A");
    assert_eq!(messages[3]["content"][0]["tool_use_id"], "toolu_B");
}

#[test]
fn test_tool_use_id_sanitization_keeps_pairing() {
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::tool_use("call 1.x:y", "bash", json!({"command": "ls"})).with_sequence(0),
            Block::tool_result("call 1.x:y", "ok").with_sequence(1),
        ],
    )];
    let messages = debug_messages(conversation);

    assert_eq!(messages[0]["content"][0]["id"], "call_1_x_y");
    assert_eq!(messages[1]["content"][0]["tool_use_id"], "call_1_x_y");
}

#[test]
fn test_signed_thinking_replays_natively() {
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::thinking("chain of thought")
                .with_sequence(0)
                .with_source_backend(BackendId::Anthropic)
                .with_provider_data(json!({"signature": "sig_0123"})),
            Block::text("the answer").with_sequence(1),
        ],
    )];
    let messages = debug_messages(conversation);

    assert_eq!(messages[0]["content"][0]["type"], "thinking");
    assert_eq!(messages[0]["content"][0]["thinking"], "chain of thought");
    assert_eq!(messages[0]["content"][0]["signature"], "sig_0123");
}

#[test]
fn test_unsigned_thinking_becomes_tagged_text() {
    // Thinking imported from another backend carries no signature; the API
    // rejects unsigned thinking blocks, so it travels as tagged text.
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::thinking("borrowed reasoning")
                .with_sequence(0)
                .with_source_backend(BackendId::OpenRouter),
        ],
    )];
    let messages = debug_messages(conversation);

    assert_eq!(messages[0]["content"][0]["type"], "text");
    assert_eq!(
        messages[0]["content"][0]["text"],
        "<thinking>\nborrowed reasoning\n</thinking>"
    );
}

#[test]
fn test_same_backend_web_search_replay_is_byte_faithful() {
    let use_data = json!({
        "type": "server_tool_use",
        "id": "srvtoolu_1",
        "name": "web_search",
        "input": {"query": "rust streams"},
    });
    let result_data = json!({
        "type": "web_search_tool_result",
        "tool_use_id": "srvtoolu_1",
        "content": {
            "type": "web_search_tool_result_success",
            "results": [{
                "type": "web_search_result",
                "url": "https://example.com",
                "title": "Example",
                "page_age": "2 days",
                "encrypted_content": "EqgfCioIAxgCIiQ3YmU4",
            }],
        },
    });

    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::web_search_use_with_input("srvtoolu_1", "web_search", json!({"query": "rust streams"}))
                .with_sequence(0)
                .with_execution_side(ExecutionSide::Provider)
                .with_source_backend(BackendId::Anthropic)
                .with_provider_data(use_data.clone()),
            Block::web_search_result("srvtoolu_1", vec![])
                .with_sequence(1)
                .with_source_backend(BackendId::Anthropic)
                .with_provider_data(result_data.clone()),
            Block::text("Found it.").with_sequence(2),
        ],
    )];
    let messages = debug_messages(conversation);
    let content = messages[0]["content"].as_array().unwrap();

    // The replayed wire blocks match the preserved originals field-for-field.
    assert_eq!(content[0], use_data);
    assert_eq!(content[1]["type"], "web_search_tool_result");
    assert_eq!(content[1]["tool_use_id"], "srvtoolu_1");
    assert_eq!(
        content[1]["content"],
        result_data["content"]["results"],
        "replay rebuilds the result array with encrypted content intact"
    );
}

#[test]
fn test_cross_backend_web_search_result_is_rejected() {
    // A web-search result from another backend has no replayable form here.
    let conversation = vec![Message::new(
        Role::Assistant,
        vec![
            Block::web_search_result("or_websearch_1", vec![])
                .with_sequence(0)
                .with_source_backend(BackendId::OpenRouter),
        ],
    )];
    let req = GenerateRequest::new("claude-sonnet-4-5", conversation);
    let err = build_request_debug(&req).unwrap_err();
    assert!(err.is_invalid_request());
}

#[test]
fn test_merge_split_idempotence() {
    // Splitting then merging a conversation is stable: doing it twice gives
    // the same message shapes as doing it once.
    let conversation = vec![
        Message::user("run the tool"),
        Message::new(
            Role::Assistant,
            vec![
                Block::text("running").with_sequence(0),
                Block::tool_use("toolu_1", "bash", json!({"command": "ls"})).with_sequence(1),
                Block::tool_result("toolu_1", "done").with_sequence(2),
            ],
        ),
        Message::user("thanks"),
    ];

    let once = debug_messages(conversation.clone());
    let twice = debug_messages(conversation);
    assert_eq!(once, twice);
}

#[test]
fn test_image_blocks_are_skipped_not_fatal() {
    let conversation = vec![Message::new(
        Role::User,
        vec![
            Block::image("https://example.com/cat.png", "image/png").with_sequence(0),
            Block::text("what is this?").with_sequence(1),
        ],
    )];
    let messages = debug_messages(conversation);
    let content = messages[0]["content"].as_array().unwrap();
    assert_eq!(content.len(), 1);
    assert_eq!(content[0]["type"], "text");
}

#[test]
fn test_stream_flag_is_the_only_difference() {
    let req = GenerateRequest::new("claude-sonnet-4-5", vec![Message::user("Hi")]).with_params(
        RequestParams {
            max_tokens: Some(128),
            ..Default::default()
        },
    );
    let value = build_request_debug(&req).unwrap();
    // The blocking path leaves the stream flag unset entirely.
    assert!(value.get("stream").is_none());
    assert_eq!(value["model"], "claude-sonnet-4-5");
    assert_eq!(value["max_tokens"], 128);
}
