use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use relay_core::config::{AppConfig, LoadOptions, CONFIG_FILE_CANDIDATES};
use secrecy::ExposeSecret;
use toml::Value;

use super::{CommandResult, EXIT_CONFIG};

struct Field {
    key: &'static str,
    value: String,
    /// Canonical variable first, then accepted aliases.
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult::text(lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let legacy_key = config
        .runtime
        .legacy_api_key
        .as_ref()
        .map(|secret| redact_token(secret.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key: "runtime.default_provider",
            value: config.runtime.default_provider.to_string(),
            env_keys: &["RELAY_RUNTIME_DEFAULT_PROVIDER"],
        },
        Field {
            key: "runtime.legacy_api_key",
            value: legacy_key,
            env_keys: &["RELAY_RUNTIME_LEGACY_API_KEY"],
        },
        Field {
            key: "runtime.request_timeout_ms",
            value: config.runtime.request_timeout_ms.to_string(),
            env_keys: &["RELAY_RUNTIME_REQUEST_TIMEOUT_MS"],
        },
        Field {
            key: "runtime.probe_timeout_ms",
            value: config.runtime.probe_timeout_ms.to_string(),
            env_keys: &["RELAY_RUNTIME_PROBE_TIMEOUT_MS"],
        },
        Field {
            key: "voice.default_provider",
            value: config.voice.default_provider.clone(),
            env_keys: &["RELAY_VOICE_DEFAULT_PROVIDER"],
        },
        Field {
            key: "voice.probe_timeout_ms",
            value: config.voice.probe_timeout_ms.to_string(),
            env_keys: &["RELAY_VOICE_PROBE_TIMEOUT_MS"],
        },
        Field {
            key: "tools.autonomy_level",
            value: config.tools.autonomy_level.as_str().to_string(),
            env_keys: &["RELAY_TOOLS_AUTONOMY_LEVEL"],
        },
        Field {
            key: "tools.approval_required",
            value: render_list(&config.tools.approval_required),
            env_keys: &["RELAY_TOOLS_APPROVAL_REQUIRED"],
        },
        Field {
            key: "tools.approval_exempt",
            value: render_list(&config.tools.approval_exempt),
            env_keys: &["RELAY_TOOLS_APPROVAL_EXEMPT"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["RELAY_LOGGING_LEVEL", "RELAY_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_keys: &["RELAY_LOGGING_FORMAT", "RELAY_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn render_list(values: &[String]) -> String {
    if values.is_empty() {
        "<none>".to_string()
    } else {
        values.join(",")
    }
}

/// `sk-live-abc` -> `sk-***`.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
