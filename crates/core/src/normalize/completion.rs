use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{capabilities, ProviderId, WireProtocol};

const EMPTY_ARGUMENTS: &str = "{}";
const FENCED_JSON_PATTERN: &str = r"(?s)```(?:json|JSON)?\s*(.*?)```";

/// A tool invocation in canonical shape. `arguments` is always a JSON text
/// that parses; malformed or missing provider arguments become `{}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<NormalizedToolCall>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuredFormat {
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "code-block")]
    CodeBlock,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutput {
    pub format: StructuredFormat,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCompletion {
    pub provider: ProviderId,
    pub choices: Vec<CompletionChoice>,
    pub usage: TokenUsage,
    pub structured_output: Option<StructuredOutput>,
    pub raw: Value,
}

impl NormalizedCompletion {
    /// Text of the first choice.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().and_then(|choice| choice.content.as_deref())
    }

    pub fn tool_calls(&self) -> &[NormalizedToolCall] {
        self.choices.first().map(|choice| choice.tool_calls.as_slice()).unwrap_or(&[])
    }
}

/// Maps a raw provider completion into the canonical shape. Never fails:
/// unrecognized payloads produce an empty choice list.
pub fn normalize_completion(provider: ProviderId, raw: Value) -> NormalizedCompletion {
    let choices = match capabilities(provider).protocol {
        WireProtocol::ChatCompletions => chat_completion_choices(&raw),
        WireProtocol::MessageBlocks => message_block_choices(&raw),
    };
    let usage = token_usage(&raw);
    let structured_output = choices
        .first()
        .and_then(|choice| choice.content.as_deref())
        .and_then(extract_structured_output);

    NormalizedCompletion { provider, choices, usage, structured_output, raw }
}

fn chat_completion_choices(raw: &Value) -> Vec<CompletionChoice> {
    if let Some(choices) = raw.get("choices").and_then(Value::as_array) {
        return choices
            .iter()
            .enumerate()
            .map(|(position, choice)| chat_completion_choice(position, choice))
            .collect();
    }

    // Responses-style payloads carry a flat `output_text`.
    raw.get("output_text")
        .and_then(Value::as_str)
        .map(|text| {
            vec![CompletionChoice {
                index: 0,
                content: Some(text.to_string()),
                tool_calls: Vec::new(),
                finish_reason: None,
            }]
        })
        .unwrap_or_default()
}

fn chat_completion_choice(position: usize, choice: &Value) -> CompletionChoice {
    let message = choice.get("message").or_else(|| choice.get("delta"));
    let content = message.and_then(|message| message.get("content")).and_then(text_content);
    let tool_calls = message
        .and_then(|message| message.get("tool_calls"))
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(call_index, call)| chat_tool_call(position, call_index, call))
                .collect()
        })
        .unwrap_or_default();

    CompletionChoice {
        index: choice
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|index| u32::try_from(index).ok())
            .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX)),
        content,
        tool_calls,
        finish_reason: choice.get("finish_reason").and_then(Value::as_str).map(str::to_string),
    }
}

fn chat_tool_call(choice_index: usize, call_index: usize, call: &Value) -> NormalizedToolCall {
    let function = call.get("function");
    let id = non_empty_str(call.get("id"))
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{choice_index}_{call_index}"));
    let name = non_empty_str(function.and_then(|function| function.get("name")))
        .or_else(|| non_empty_str(call.get("name")))
        .map(str::to_string)
        .unwrap_or_else(|| format!("tool_{call_index}"));
    let arguments = canonical_arguments(
        function.and_then(|function| function.get("arguments")).or_else(|| call.get("arguments")),
    );

    NormalizedToolCall { id, name, arguments }
}

fn message_block_choices(raw: &Value) -> Vec<CompletionChoice> {
    let Some(blocks) = raw.get("content").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut text = String::new();
    let mut saw_text = false;
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(fragment) = block.get("text").and_then(Value::as_str) {
                    text.push_str(fragment);
                    saw_text = true;
                }
            }
            Some("tool_use") => {
                let call_index = tool_calls.len();
                tool_calls.push(NormalizedToolCall {
                    id: non_empty_str(block.get("id"))
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("call_0_{call_index}")),
                    name: non_empty_str(block.get("name"))
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("tool_{call_index}")),
                    arguments: canonical_arguments(block.get("input")),
                });
            }
            _ => {}
        }
    }

    vec![CompletionChoice {
        index: 0,
        content: saw_text.then_some(text),
        tool_calls,
        finish_reason: raw.get("stop_reason").and_then(Value::as_str).map(str::to_string),
    }]
}

fn token_usage(raw: &Value) -> TokenUsage {
    let Some(usage) = raw.get("usage") else {
        return TokenUsage::default();
    };
    let count = |keys: &[&str]| keys.iter().find_map(|key| usage.get(*key).and_then(Value::as_u64));

    let prompt_tokens = count(&["prompt_tokens", "input_tokens"]).unwrap_or(0);
    let completion_tokens = count(&["completion_tokens", "output_tokens"]).unwrap_or(0);
    let total_tokens = count(&["total_tokens"])
        .unwrap_or_else(|| prompt_tokens.saturating_add(completion_tokens));

    TokenUsage { prompt_tokens, completion_tokens, total_tokens }
}

fn text_content(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let joined: String = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

fn canonical_arguments(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => EMPTY_ARGUMENTS.to_string(),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Null) | Err(_) => EMPTY_ARGUMENTS.to_string(),
            Ok(_) => text.clone(),
        },
        Some(other) => other.to_string(),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).map(str::trim).filter(|text| !text.is_empty())
}

fn fenced_json() -> Option<&'static Regex> {
    static FENCED_JSON: OnceLock<Option<Regex>> = OnceLock::new();
    FENCED_JSON.get_or_init(|| Regex::new(FENCED_JSON_PATTERN).ok()).as_ref()
}

fn extract_structured_output(content: &str) -> Option<StructuredOutput> {
    if let Ok(value) = serde_json::from_str::<Value>(content.trim()) {
        if value.is_object() || value.is_array() {
            return Some(StructuredOutput { format: StructuredFormat::Object, value });
        }
    }

    fenced_json()?.captures_iter(content).find_map(|captures| {
        let body = captures.get(1)?.as_str().trim();
        serde_json::from_str::<Value>(body)
            .ok()
            .filter(|value| value.is_object() || value.is_array())
            .map(|value| StructuredOutput { format: StructuredFormat::CodeBlock, value })
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{normalize_completion, StructuredFormat};
    use crate::provider::ProviderId;

    #[test]
    fn chat_completion_payload_maps_choices_usage_and_tool_calls() {
        let raw = json!({
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_abc", "type": "function",
                         "function": {"name": "lookup_order", "arguments": "{\"order_id\":\"42\"}"}},
                        {"type": "function", "function": {"name": "broken", "arguments": "{not json"}}
                    ]
                }
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        });

        let completion = normalize_completion(ProviderId::OpenAi, raw);

        assert_eq!(completion.choices.len(), 1);
        assert_eq!(completion.content(), None);
        let calls = completion.tool_calls();
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].arguments, r#"{"order_id":"42"}"#);
        assert_eq!(calls[1].id, "call_0_1");
        assert_eq!(calls[1].arguments, "{}");
        assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(completion.usage.total_tokens, 20);
        assert!(completion.structured_output.is_none());
    }

    #[test]
    fn object_arguments_and_missing_names_are_synthesized() {
        let raw = json!({
            "choices": [{"message": {"tool_calls": [
                {"function": {"arguments": {"city": "Lisbon"}}},
                {"function": {"name": "noop"}}
            ]}}]
        });

        let completion = normalize_completion(ProviderId::Groq, raw);
        let calls = completion.tool_calls();

        assert_eq!(calls[0].name, "tool_0");
        assert_eq!(calls[0].arguments, r#"{"city":"Lisbon"}"#);
        assert_eq!(calls[1].arguments, "{}");
        assert_eq!(completion.choices[0].index, 0);
    }

    #[test]
    fn message_blocks_payload_concatenates_text_and_serializes_tool_input() {
        let raw = json!({
            "id": "msg_1",
            "type": "message",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Checking "},
                {"type": "text", "text": "inventory."},
                {"type": "tool_use", "id": "toolu_1", "name": "inventory", "input": {"sku": "A-1"}}
            ],
            "usage": {"input_tokens": 30, "output_tokens": 11}
        });

        let completion = normalize_completion(ProviderId::Anthropic, raw);

        assert_eq!(completion.content(), Some("Checking inventory."));
        assert_eq!(completion.tool_calls()[0].id, "toolu_1");
        assert_eq!(completion.tool_calls()[0].arguments, r#"{"sku":"A-1"}"#);
        assert_eq!(completion.usage.prompt_tokens, 30);
        assert_eq!(completion.usage.total_tokens, 41);
        assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn output_text_fallback_and_unknown_payloads() {
        let flat = normalize_completion(ProviderId::OpenAi, json!({"output_text": "hello"}));
        assert_eq!(flat.content(), Some("hello"));

        let empty = normalize_completion(ProviderId::OpenAi, json!({"unexpected": true}));
        assert!(empty.choices.is_empty());
        assert_eq!(empty.usage.total_tokens, 0);
        assert_eq!(empty.raw, json!({"unexpected": true}));
    }

    #[test]
    fn structured_output_detects_plain_json_then_fenced_blocks() {
        let plain = normalize_completion(
            ProviderId::OpenAi,
            json!({"choices": [{"message": {"content": " {\"ok\": true} "}}]}),
        );
        let structured = plain.structured_output.expect("plain object");
        assert_eq!(structured.format, StructuredFormat::Object);
        assert_eq!(structured.value, json!({"ok": true}));

        let fenced = normalize_completion(
            ProviderId::Anthropic,
            json!({"content": [{"type": "text",
                "text": "Here you go:\n```json\n{\"items\": [1, 2]}\n```\nDone."}]}),
        );
        let structured = fenced.structured_output.expect("fenced object");
        assert_eq!(structured.format, StructuredFormat::CodeBlock);
        assert_eq!(structured.value, json!({"items": [1, 2]}));

        let prose = normalize_completion(
            ProviderId::OpenAi,
            json!({"choices": [{"message": {"content": "42"}}]}),
        );
        assert!(prose.structured_output.is_none());
    }

    #[test]
    fn inline_fenced_block_is_detected() {
        let inline = normalize_completion(
            ProviderId::OpenAi,
            json!({"choices": [{"message": {"content": "Result: ```json {\"a\": 1} ```"}}]}),
        );
        let structured = inline.structured_output.expect("inline fenced object");
        assert_eq!(structured.format, StructuredFormat::CodeBlock);
        assert_eq!(structured.value, json!({"a": 1}));
    }

    #[test]
    fn null_argument_text_becomes_empty_object() {
        let raw = json!({"choices": [{"message": {"tool_calls": [
            {"id": "c1", "function": {"name": "t", "arguments": "null"}},
            {"id": "c2", "function": {"name": "t", "arguments": null}},
            {"id": "c3", "function": {"name": "t", "arguments": "{\"k\": 2}"}}
        ]}}]});

        let completion = normalize_completion(ProviderId::OpenAi, raw);
        let arguments: Vec<&str> =
            completion.tool_calls().iter().map(|call| call.arguments.as_str()).collect();
        assert_eq!(arguments, vec!["{}", "{}", r#"{"k": 2}"#]);
    }

    #[test]
    fn content_parts_are_joined() {
        let raw = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "a"}, {"type": "text", "text": "b"}
        ]}}]});
        assert_eq!(normalize_completion(ProviderId::Mistral, raw).content(), Some("ab"));
    }
}
