use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::completion::NormalizedToolCall;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Canonical conversation message, always in the chat-completions shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<NormalizedToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None, name: None }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant turn that requested tools, echoed back before the results.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<NormalizedToolCall>) -> Self {
        Self { role: Role::Assistant, content, tool_calls, tool_call_id: None, name: None }
    }
}

pub fn format_tool_result_message(tool_call_id: &str, tool_name: &str, result: &Value) -> ChatMessage {
    tool_message(tool_call_id, tool_name, result.to_string())
}

pub fn format_tool_error_message(tool_call_id: &str, tool_name: &str, error: &str) -> ChatMessage {
    tool_message(tool_call_id, tool_name, json!({ "error": error }).to_string())
}

fn tool_message(tool_call_id: &str, tool_name: &str, content: String) -> ChatMessage {
    ChatMessage {
        role: Role::Tool,
        content: Some(content),
        tool_calls: Vec::new(),
        tool_call_id: Some(tool_call_id.to_string()),
        name: Some(tool_name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{format_tool_error_message, format_tool_result_message, Role};

    #[test]
    fn tool_result_envelope_serializes_content_as_json_text() {
        let message = format_tool_result_message("call_1", "lookup", &json!({"rows": 3}));

        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.name.as_deref(), Some("lookup"));
        let content: Value =
            serde_json::from_str(message.content.as_deref().expect("content")).expect("json content");
        assert_eq!(content, json!({"rows": 3}));
    }

    #[test]
    fn tool_error_envelope_wraps_message() {
        let message = format_tool_error_message("call_2", "lookup", "tool is temporarily unavailable");
        let wire = serde_json::to_value(&message).expect("serialize");

        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["content"], r#"{"error":"tool is temporarily unavailable"}"#);
        assert!(wire.get("tool_calls").is_none());
    }
}
