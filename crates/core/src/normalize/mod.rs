//! Protocol normalization.
//!
//! Raw provider payloads from both wire families come in; one canonical
//! completion, tool-call, and error shape goes out. Translation back to a
//! provider's request shape happens only in [`request`].

pub mod completion;
pub mod error;
pub mod messages;
pub mod request;

use crate::provider::{capabilities, ProviderId, DEFAULT_PROVIDER, PROVIDER_SPECS};

pub use completion::{
    normalize_completion, CompletionChoice, NormalizedCompletion, NormalizedToolCall,
    StructuredFormat, StructuredOutput, TokenUsage,
};
pub use error::{normalize_error, ErrorClass, NormalizedError};
pub use messages::{format_tool_error_message, format_tool_result_message, ChatMessage, Role};
pub use request::{build_request_body, build_wire_request, ChatRequest, ToolSchema, WireRequest};

/// Resolves a free-form alias, model name, or `<provider>/<model>` composite
/// to a canonical provider id.
pub fn detect_provider(token: &str, fallback: Option<ProviderId>) -> ProviderId {
    let normalized = token.trim().to_ascii_lowercase();
    let head = normalized.split_once('/').map(|(head, _)| head).unwrap_or(&normalized);

    lookup_alias(head)
        .or_else(|| lookup_model_family(head))
        .or(fallback)
        .unwrap_or(DEFAULT_PROVIDER)
}

/// Strips a redundant `<provider>/` prefix unless the provider routes on it.
pub fn normalize_model_for_provider(provider: ProviderId, model: &str) -> String {
    let model = model.trim();
    if capabilities(provider).keeps_model_prefix {
        return model.to_string();
    }

    match model.split_once('/') {
        Some((prefix, rest)) if !rest.is_empty() && lookup_alias(prefix) == Some(provider) => {
            rest.to_string()
        }
        _ => model.to_string(),
    }
}

fn lookup_alias(token: &str) -> Option<ProviderId> {
    let token = token.trim().to_ascii_lowercase();
    if token.is_empty() {
        return None;
    }
    ProviderId::parse(&token).or_else(|| {
        PROVIDER_SPECS
            .iter()
            .find(|spec| spec.aliases.iter().any(|alias| *alias == token))
            .map(|spec| spec.id)
    })
}

/// `claude-3-5-sonnet` -> anthropic, `gpt-4o` -> openai.
fn lookup_model_family(token: &str) -> Option<ProviderId> {
    let (family, _) = token.split_once(['-', ':'])?;
    lookup_alias(family)
}
