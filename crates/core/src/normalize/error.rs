use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ProviderId;

const UNKNOWN_MESSAGE: &str = "unknown provider error";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Auth,
    RateLimit,
    Quota,
    InvalidRequest,
    ProviderUnavailable,
    Network,
    Timeout,
    Safety,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Quota => "quota",
            Self::InvalidRequest => "invalid_request",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Safety => "safety",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::ProviderUnavailable | Self::Network | Self::Timeout | Self::Unknown
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub provider: ProviderId,
    pub message: String,
    pub status_code: Option<u16>,
    pub provider_code: Option<String>,
    pub class: ErrorClass,
    pub retryable: bool,
}

/// Classifies a provider failure. The status code decides when present;
/// message keywords decide only when it is absent.
pub fn normalize_error(provider: ProviderId, raw: &Value, status_code: Option<u16>) -> NormalizedError {
    let (message, provider_code) = extract_message_and_code(raw);
    let class = classify(status_code, &message);

    NormalizedError {
        provider,
        message,
        status_code,
        provider_code,
        class,
        retryable: class.is_retryable(),
    }
}

fn classify(status_code: Option<u16>, message: &str) -> ErrorClass {
    let lowered = message.to_ascii_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));

    match status_code {
        Some(401 | 403) => ErrorClass::Auth,
        Some(429) if mentions(&["quota", "credit", "billing"]) => ErrorClass::Quota,
        Some(429) => ErrorClass::RateLimit,
        Some(400 | 404 | 409 | 422) => ErrorClass::InvalidRequest,
        Some(status) if status >= 500 => ErrorClass::ProviderUnavailable,
        Some(_) => ErrorClass::Unknown,
        None if mentions(&["timeout", "timed out", "deadline exceeded"]) => ErrorClass::Timeout,
        None if mentions(&[
            "network",
            "connection",
            "connect error",
            "econnreset",
            "econnrefused",
            "dns",
            "socket",
        ]) =>
        {
            ErrorClass::Network
        }
        None if mentions(&["safety", "content policy", "content_filter", "moderation", "blocked"]) => {
            ErrorClass::Safety
        }
        None => ErrorClass::Unknown,
    }
}

/// Handles `{"error": {"message", "code"|"type"}}`, `{"error": "..."}`,
/// `{"message": "..."}`, and bare strings.
fn extract_message_and_code(raw: &Value) -> (String, Option<String>) {
    match raw {
        Value::String(text) => (non_blank(text).unwrap_or(UNKNOWN_MESSAGE).to_string(), None),
        Value::Object(_) => {
            let nested = raw.get("error");
            let message = match nested {
                Some(Value::String(text)) => non_blank(text).map(str::to_string),
                Some(error) => error.get("message").and_then(Value::as_str).and_then(non_blank).map(str::to_string),
                None => None,
            }
            .or_else(|| raw.get("message").and_then(Value::as_str).and_then(non_blank).map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_MESSAGE.to_string());

            let code = nested
                .and_then(|error| error.get("code").or_else(|| error.get("type")))
                .or_else(|| raw.get("code"))
                .and_then(code_string);

            (message, code)
        }
        _ => (UNKNOWN_MESSAGE.to_string(), None),
    }
}

fn code_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => non_blank(text).map(str::to_string),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn non_blank(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{normalize_error, ErrorClass};
    use crate::provider::ProviderId;

    #[test]
    fn status_code_decides_class() {
        let cases = [
            (401, ErrorClass::Auth),
            (403, ErrorClass::Auth),
            (429, ErrorClass::RateLimit),
            (400, ErrorClass::InvalidRequest),
            (404, ErrorClass::InvalidRequest),
            (422, ErrorClass::InvalidRequest),
            (500, ErrorClass::ProviderUnavailable),
            (503, ErrorClass::ProviderUnavailable),
            (418, ErrorClass::Unknown),
        ];
        for (status, expected) in cases {
            let error = normalize_error(ProviderId::OpenAi, &json!({"error": {"message": "x"}}), Some(status));
            assert_eq!(error.class, expected, "status {status}");
        }
    }

    #[test]
    fn quota_is_distinguished_from_rate_limit_by_message() {
        let raw = json!({"error": {"message": "You exceeded your current quota", "code": "insufficient_quota"}});
        let error = normalize_error(ProviderId::OpenAi, &raw, Some(429));

        assert_eq!(error.class, ErrorClass::Quota);
        assert!(!error.retryable);
        assert_eq!(error.provider_code.as_deref(), Some("insufficient_quota"));
    }

    #[test]
    fn status_wins_over_message_keywords() {
        let error = normalize_error(
            ProviderId::Groq,
            &json!({"error": "connection timed out upstream"}),
            Some(401),
        );
        assert_eq!(error.class, ErrorClass::Auth);
        assert!(!error.retryable);
    }

    #[test]
    fn message_heuristics_apply_without_status() {
        let timeout = normalize_error(ProviderId::OpenAi, &json!("request timed out after 30s"), None);
        assert_eq!(timeout.class, ErrorClass::Timeout);
        assert!(timeout.retryable);

        let network = normalize_error(ProviderId::OpenAi, &json!("ECONNRESET while reading body"), None);
        assert_eq!(network.class, ErrorClass::Network);

        let safety = normalize_error(
            ProviderId::Anthropic,
            &json!({"message": "Output blocked by content policy"}),
            None,
        );
        assert_eq!(safety.class, ErrorClass::Safety);
        assert!(!safety.retryable);
    }

    #[test]
    fn message_block_error_envelope_is_read() {
        let raw = json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}});
        let error = normalize_error(ProviderId::Anthropic, &raw, Some(529));

        assert_eq!(error.message, "Overloaded");
        assert_eq!(error.provider_code.as_deref(), Some("overloaded_error"));
        assert_eq!(error.class, ErrorClass::ProviderUnavailable);
        assert!(error.retryable);
    }

    #[test]
    fn unparseable_payloads_fall_back_to_unknown() {
        let error = normalize_error(ProviderId::Mistral, &json!(null), None);
        assert_eq!(error.class, ErrorClass::Unknown);
        assert_eq!(error.message, "unknown provider error");
        assert!(error.retryable);
    }
}
