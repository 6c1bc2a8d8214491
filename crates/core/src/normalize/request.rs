//! Translation from canonical messages to a provider's wire request.

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::messages::{ChatMessage, Role};
use super::normalize_model_for_provider;
use crate::bindings::ResolvedBinding;
use crate::provider::{capabilities, ProviderId, WireProtocol};

/// Message-blocks requests must carry `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u32 = 4_096;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    /// Ask for a bare JSON object reply where the provider can enforce it.
    #[serde(default)]
    pub json_output: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
            stream: false,
            json_output: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Fills in tool call ids for providers that insist on them and drops empty
/// ids for the rest. Missing ids are numbered by position, so the n-th
/// id-less call pairs with the n-th id-less result.
struct ToolCallIds {
    required: bool,
    calls: usize,
    results: usize,
}

impl ToolCallIds {
    fn new(provider: ProviderId) -> Self {
        Self { required: capabilities(provider).requires_tool_call_id, calls: 0, results: 0 }
    }

    fn for_call(&mut self, id: &str) -> Option<String> {
        if !id.is_empty() {
            return Some(id.to_string());
        }
        self.calls += 1;
        self.required.then(|| format!("call_{}", self.calls))
    }

    fn for_result(&mut self, id: Option<&str>) -> Option<String> {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        self.results += 1;
        self.required.then(|| format!("call_{}", self.results))
    }
}

/// Everything needed to send one request; holds the secret in a header
/// value, so it is not `Serialize` either.
#[derive(Clone, Debug)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

pub fn build_wire_request(binding: &ResolvedBinding, request: &ChatRequest) -> WireRequest {
    let spec = binding.provider.spec();
    let path = match spec.capabilities.protocol {
        WireProtocol::ChatCompletions => "chat/completions",
        WireProtocol::MessageBlocks => "messages",
    };
    let mut headers = spec.auth_headers(binding.secret.expose_secret());
    headers.push(("content-type", "application/json".to_string()));

    WireRequest {
        url: format!("{}/{path}", binding.endpoint.trim_end_matches('/')),
        headers,
        body: build_request_body(binding.provider, request),
    }
}

pub fn build_request_body(provider: ProviderId, request: &ChatRequest) -> Value {
    match capabilities(provider).protocol {
        WireProtocol::ChatCompletions => chat_completions_body(provider, request),
        WireProtocol::MessageBlocks => message_blocks_body(provider, request),
    }
}

fn chat_completions_body(provider: ProviderId, request: &ChatRequest) -> Value {
    let caps = capabilities(provider);
    let mut ids = ToolCallIds::new(provider);
    let mut body = Map::new();
    body.insert("model".into(), json!(normalize_model_for_provider(provider, &request.model)));
    body.insert(
        "messages".into(),
        Value::Array(
            request.messages.iter().map(|message| chat_completions_message(message, &mut ids)).collect(),
        ),
    );
    if caps.supports_tool_calling && !request.tools.is_empty() {
        body.insert(
            "tools".into(),
            Value::Array(
                request
                    .tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool.parameters,
                            }
                        })
                    })
                    .collect(),
            ),
        );
    }
    if let Some(temperature) = request.temperature {
        body.insert("temperature".into(), json!(temperature));
    }
    if let Some(max_tokens) = request.max_tokens {
        body.insert("max_tokens".into(), json!(max_tokens));
    }
    if request.json_output && caps.supports_structured_output {
        body.insert("response_format".into(), json!({"type": "json_object"}));
    }
    body.insert("stream".into(), json!(request.stream));
    Value::Object(body)
}

fn chat_completions_message(message: &ChatMessage, ids: &mut ToolCallIds) -> Value {
    let mut wire = Map::new();
    wire.insert("role".into(), json!(message.role));
    wire.insert("content".into(), json!(message.content));
    if !message.tool_calls.is_empty() {
        wire.insert(
            "tool_calls".into(),
            Value::Array(
                message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        let mut wire_call = Map::new();
                        if let Some(id) = ids.for_call(&call.id) {
                            wire_call.insert("id".into(), json!(id));
                        }
                        wire_call.insert("type".into(), json!("function"));
                        wire_call.insert(
                            "function".into(),
                            json!({"name": call.name, "arguments": call.arguments}),
                        );
                        Value::Object(wire_call)
                    })
                    .collect(),
            ),
        );
    }
    if message.role == Role::Tool {
        if let Some(tool_call_id) = ids.for_result(message.tool_call_id.as_deref()) {
            wire.insert("tool_call_id".into(), json!(tool_call_id));
        }
    }
    if let Some(name) = &message.name {
        wire.insert("name".into(), json!(name));
    }
    Value::Object(wire)
}

/// System messages are hoisted into `system`; runs of tool results fold into
/// a single user turn of `tool_result` blocks.
fn message_blocks_body(provider: ProviderId, request: &ChatRequest) -> Value {
    let mut ids = ToolCallIds::new(provider);
    let mut system = Vec::new();
    let mut messages: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    for message in &request.messages {
        if message.role != Role::Tool && !pending_results.is_empty() {
            messages.push(json!({"role": "user", "content": std::mem::take(&mut pending_results)}));
        }
        match message.role {
            Role::System => {
                if let Some(content) = message.content.as_deref().filter(|text| !text.is_empty()) {
                    system.push(content.to_string());
                }
            }
            Role::Tool => pending_results.push(tool_result_block(message, &mut ids)),
            Role::User => messages.push(json!({"role": "user", "content": text_blocks(message)})),
            Role::Assistant => {
                let mut blocks = text_blocks(message);
                blocks.extend(message.tool_calls.iter().map(|call| {
                    json!({
                        "type": "tool_use",
                        "id": ids.for_call(&call.id).unwrap_or_default(),
                        "name": call.name,
                        "input": serde_json::from_str::<Value>(&call.arguments)
                            .ok()
                            .filter(Value::is_object)
                            .unwrap_or_else(|| json!({})),
                    })
                }));
                messages.push(json!({"role": "assistant", "content": blocks}));
            }
        }
    }
    if !pending_results.is_empty() {
        messages.push(json!({"role": "user", "content": pending_results}));
    }

    let mut body = Map::new();
    body.insert("model".into(), json!(normalize_model_for_provider(provider, &request.model)));
    if !system.is_empty() {
        body.insert("system".into(), json!(system.join("\n\n")));
    }
    body.insert("messages".into(), Value::Array(messages));
    body.insert("max_tokens".into(), json!(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)));
    if capabilities(provider).supports_tool_calling && !request.tools.is_empty() {
        body.insert(
            "tools".into(),
            Value::Array(
                request
                    .tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "name": tool.name,
                            "description": tool.description,
                            "input_schema": tool.parameters,
                        })
                    })
                    .collect(),
            ),
        );
    }
    if let Some(temperature) = request.temperature {
        body.insert("temperature".into(), json!(temperature));
    }
    body.insert("stream".into(), json!(request.stream));
    Value::Object(body)
}

fn text_blocks(message: &ChatMessage) -> Vec<Value> {
    message
        .content
        .as_deref()
        .filter(|text| !text.is_empty())
        .map(|text| vec![json!({"type": "text", "text": text})])
        .unwrap_or_default()
}

fn tool_result_block(message: &ChatMessage, ids: &mut ToolCallIds) -> Value {
    let content = message.content.clone().unwrap_or_default();
    let is_error = serde_json::from_str::<Value>(&content)
        .ok()
        .and_then(|value| value.as_object().map(|object| object.len() == 1 && object.contains_key("error")))
        .unwrap_or(false);

    json!({
        "type": "tool_result",
        "tool_use_id": ids.for_result(message.tool_call_id.as_deref()).unwrap_or_default(),
        "content": content,
        "is_error": is_error,
    })
}
