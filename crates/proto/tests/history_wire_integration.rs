use proto::{AgentEvent, ContentUnit, ConversationHistory, ResultPart, Role, Turn};
use serde_json::json;

#[test]
fn client_history_with_tool_results_parses_and_serializes() {
    let submitted = json!([
        {"role": "user", "content": "Open example.com"},
        {"role": "assistant", "content": [
            {"type": "text", "text": "Navigating."},
            {"type": "tool_invocation", "id": "tu_1", "name": "go_to_url",
             "arguments": {"url": "https://example.com"}}
        ]},
        {"role": "user", "content": [
            {"type": "tool_result", "invocation_id": "tu_1", "is_error": false, "parts": [
                {"type": "image", "image": {"media_type": "image/png", "data": "iVBORw=="}},
                {"type": "text", "text": "loaded"}
            ]}
        ]}
    ]);

    let history: ConversationHistory =
        serde_json::from_value(submitted).expect("deserialize history");
    assert_eq!(history.len(), 3);
    assert_eq!(history.image_count(), 1);
    assert_eq!(
        history.shape(),
        vec!["user[text]", "assistant[text,tool_invocation]", "user[tool_result]"]
    );

    let ContentUnit::ToolResult { parts, .. } = &history.turns()[2].content[0] else {
        panic!("expected tool result");
    };
    let ResultPart::Image { image } = &parts[0] else {
        panic!("expected image part");
    };
    assert_eq!(image.data, vec![0x89, b'P', b'N', b'G']);

    let reencoded = serde_json::to_value(&history).expect("serialize history");
    assert_eq!(reencoded[2]["content"][0]["parts"][0]["image"]["data"], "iVBORw==");
    assert_eq!(reencoded[0]["content"][0]["type"], "text");
}

#[test]
fn history_referencing_unknown_invocation_is_rejected() {
    let submitted = json!([
        {"role": "user", "content": "hi"},
        {"role": "user", "content": [
            {"type": "tool_result", "invocation_id": "never_called", "is_error": false, "parts": []}
        ]}
    ]);
    let parsed: Result<ConversationHistory, _> = serde_json::from_value(submitted);
    assert!(parsed.is_err());
}

#[test]
fn tool_result_event_wire_shape() {
    let event = AgentEvent::ToolResult {
        turn: Turn::new(
            Role::User,
            vec![ContentUnit::ToolResult {
                invocation_id: "tu_9".to_string(),
                parts: vec![ResultPart::Text {
                    text: "successfully saved to memory".to_string(),
                }],
                is_error: false,
            }],
        ),
    };

    let value = serde_json::to_value(&event).expect("serialize event");
    assert_eq!(value["type"], "tool_result");
    assert_eq!(value["turn"]["role"], "user");
    assert_eq!(value["turn"]["content"][0]["invocation_id"], "tu_9");

    let back: AgentEvent = serde_json::from_value(value).expect("deserialize event");
    assert_eq!(back, event);
    assert_eq!(back.name(), "tool_result");
}
