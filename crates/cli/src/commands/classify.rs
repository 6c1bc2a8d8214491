use relay_core::errors::ApplicationError;
use relay_core::normalize::{detect_provider, normalize_error, NormalizedError};
use serde::Serialize;
use serde_json::json;

use super::CommandResult;

/// The normalized error plus what a caller-facing edge would show for it.
#[derive(Debug, Serialize)]
struct Classification {
    #[serde(flatten)]
    error: NormalizedError,
    surfaced_as: &'static str,
    user_message: &'static str,
}

pub fn run(provider: &str, status: Option<u16>, message: &str) -> CommandResult {
    let raw = json!({ "error": { "message": message } });
    let normalized = normalize_error(detect_provider(provider, None), &raw, status);
    let surfaced = ApplicationError::Provider(normalized.clone()).into_interface("classify");
    let classification = Classification {
        error: normalized,
        surfaced_as: surfaced.kind(),
        user_message: surfaced.user_message(),
    };
    CommandResult::report("classify", "error", &classification)
}
