pub mod bindings;
pub mod classify;
pub mod config;
pub mod doctor;
pub mod normalize;
pub mod voice;

use relay_core::errors::InterfaceError;
use serde::Serialize;
use serde_json::{Map, Value};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_INVALID_INPUT: u8 = 3;
pub const EXIT_CATALOG: u8 = 4;
pub const EXIT_NO_BINDING: u8 = 5;
pub const EXIT_RUNTIME: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl CommandResult {
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            correlation_id: None,
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    /// Failure envelope for a caller-facing error: the safe user message and
    /// the correlation id that ties it to the logs, never the internal text.
    pub fn interface_failure(command: &str, error: &InterfaceError, exit_code: u8) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error.kind().to_string()),
            message: error.user_message().to_string(),
            correlation_id: Some(error.correlation_id().to_string()),
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    /// Success envelope carrying `value` under `field`.
    pub fn report<T: Serialize>(command: &str, field: &str, value: &T) -> Self {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(error) => return Self::failure(command, "serialization", error.to_string(), 1),
        };

        let mut payload = Map::new();
        payload.insert("command".to_string(), Value::String(command.to_string()));
        payload.insert("status".to_string(), Value::String("ok".to_string()));
        payload.insert(field.to_string(), value);
        Self { exit_code: 0, output: serialize_payload(&Value::Object(payload)) }
    }

    pub fn text(output: String) -> Self {
        Self { exit_code: 0, output }
    }
}

fn serialize_payload<T: Serialize>(payload: &T) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
