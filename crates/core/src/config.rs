use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::{ProviderId, DEFAULT_PROVIDER};

/// Voice provider ids and aliases accepted for `voice.default_provider`.
pub const VOICE_PROVIDER_NAMES: &[&str] = &[
    "browser",
    "local",
    "web",
    "elevenlabs",
    "eleven_labs",
    "11labs",
    "deepgram",
    "openai",
    "openai_realtime",
];

/// Searched in order when no explicit path is given.
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["relay.toml", "config/relay.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub voice: VoiceConfig,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub default_provider: ProviderId,
    pub legacy_api_key: Option<SecretString>,
    pub request_timeout_ms: u64,
    pub probe_timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct VoiceConfig {
    pub default_provider: String,
    pub probe_timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ToolsConfig {
    pub autonomy_level: AutonomyLevel,
    pub approval_required: Vec<String>,
    pub approval_exempt: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// How much a session may do without a human in the loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    Supervised,
    Assisted,
    Autonomous,
}

impl AutonomyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervised => "supervised",
            Self::Assisted => "assisted",
            Self::Autonomous => "autonomous",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub default_provider: Option<ProviderId>,
    pub legacy_api_key: Option<String>,
    pub voice_provider: Option<String>,
    pub autonomy_level: Option<AutonomyLevel>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig {
                default_provider: DEFAULT_PROVIDER,
                legacy_api_key: None,
                request_timeout_ms: 30_000,
                probe_timeout_ms: 5_000,
            },
            voice: VoiceConfig { default_provider: "browser".to_string(), probe_timeout_ms: 3_000 },
            tools: ToolsConfig {
                autonomy_level: AutonomyLevel::Supervised,
                approval_required: Vec::new(),
                approval_exempt: Vec::new(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for AutonomyLevel {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supervised" => Ok(Self::Supervised),
            "assisted" => Ok(Self::Assisted),
            "autonomous" | "full" => Ok(Self::Autonomous),
            other => Err(ConfigError::Validation(format!(
                "unsupported autonomy level `{other}` (expected supervised|assisted|autonomous)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(runtime) = patch.runtime {
            if let Some(default_provider) = runtime.default_provider {
                self.runtime.default_provider = parse_provider(&default_provider)?;
            }
            if let Some(legacy_api_key) = runtime.legacy_api_key {
                self.runtime.legacy_api_key = non_blank_secret(legacy_api_key);
            }
            if let Some(request_timeout_ms) = runtime.request_timeout_ms {
                self.runtime.request_timeout_ms = request_timeout_ms;
            }
            if let Some(probe_timeout_ms) = runtime.probe_timeout_ms {
                self.runtime.probe_timeout_ms = probe_timeout_ms;
            }
        }

        if let Some(voice) = patch.voice {
            if let Some(default_provider) = voice.default_provider {
                self.voice.default_provider = default_provider;
            }
            if let Some(probe_timeout_ms) = voice.probe_timeout_ms {
                self.voice.probe_timeout_ms = probe_timeout_ms;
            }
        }

        if let Some(tools) = patch.tools {
            if let Some(autonomy_level) = tools.autonomy_level {
                self.tools.autonomy_level = autonomy_level;
            }
            if let Some(approval_required) = tools.approval_required {
                self.tools.approval_required = normalize_tool_names(approval_required);
            }
            if let Some(approval_exempt) = tools.approval_exempt {
                self.tools.approval_exempt = normalize_tool_names(approval_exempt);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RELAY_RUNTIME_DEFAULT_PROVIDER") {
            self.runtime.default_provider = ProviderId::parse(&value).ok_or_else(|| {
                ConfigError::InvalidEnvOverride {
                    key: "RELAY_RUNTIME_DEFAULT_PROVIDER".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("RELAY_RUNTIME_LEGACY_API_KEY") {
            self.runtime.legacy_api_key = Some(SecretString::from(value));
        }
        if let Some(value) = read_env("RELAY_RUNTIME_REQUEST_TIMEOUT_MS") {
            self.runtime.request_timeout_ms = parse_u64("RELAY_RUNTIME_REQUEST_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("RELAY_RUNTIME_PROBE_TIMEOUT_MS") {
            self.runtime.probe_timeout_ms = parse_u64("RELAY_RUNTIME_PROBE_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("RELAY_VOICE_DEFAULT_PROVIDER") {
            self.voice.default_provider = value;
        }
        if let Some(value) = read_env("RELAY_VOICE_PROBE_TIMEOUT_MS") {
            self.voice.probe_timeout_ms = parse_u64("RELAY_VOICE_PROBE_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("RELAY_TOOLS_AUTONOMY_LEVEL") {
            self.tools.autonomy_level = value.parse()?;
        }
        if let Some(value) = read_env("RELAY_TOOLS_APPROVAL_REQUIRED") {
            self.tools.approval_required = split_list(&value);
        }
        if let Some(value) = read_env("RELAY_TOOLS_APPROVAL_EXEMPT") {
            self.tools.approval_exempt = split_list(&value);
        }

        let log_level = read_env("RELAY_LOGGING_LEVEL").or_else(|| read_env("RELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("RELAY_LOGGING_FORMAT").or_else(|| read_env("RELAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(default_provider) = overrides.default_provider {
            self.runtime.default_provider = default_provider;
        }
        if let Some(legacy_api_key) = overrides.legacy_api_key {
            self.runtime.legacy_api_key = non_blank_secret(legacy_api_key);
        }
        if let Some(voice_provider) = overrides.voice_provider {
            self.voice.default_provider = voice_provider;
        }
        if let Some(autonomy_level) = overrides.autonomy_level {
            self.tools.autonomy_level = autonomy_level;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_runtime(&self.runtime)?;
        validate_voice(&self.voice, &self.runtime)?;
        validate_tools(&self.tools)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_runtime(runtime: &RuntimeConfig) -> Result<(), ConfigError> {
    if runtime.request_timeout_ms == 0 || runtime.request_timeout_ms > 600_000 {
        return Err(ConfigError::Validation(
            "runtime.request_timeout_ms must be in range 1..=600000".to_string(),
        ));
    }

    if runtime.probe_timeout_ms == 0 || runtime.probe_timeout_ms >= runtime.request_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "runtime.probe_timeout_ms must be greater than zero and below runtime.request_timeout_ms ({})",
            runtime.request_timeout_ms
        )));
    }

    if let Some(key) = &runtime.legacy_api_key {
        if key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "runtime.legacy_api_key must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_voice(voice: &VoiceConfig, runtime: &RuntimeConfig) -> Result<(), ConfigError> {
    let requested = voice.default_provider.trim().to_ascii_lowercase();
    if requested.is_empty() {
        return Err(ConfigError::Validation("voice.default_provider must not be empty".to_string()));
    }
    if !VOICE_PROVIDER_NAMES.contains(&requested.as_str()) {
        return Err(ConfigError::Validation(format!(
            "voice.default_provider `{}` is not a known voice provider (expected one of {})",
            voice.default_provider,
            VOICE_PROVIDER_NAMES.join("|")
        )));
    }

    if voice.probe_timeout_ms == 0 || voice.probe_timeout_ms >= runtime.request_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "voice.probe_timeout_ms must be greater than zero and below runtime.request_timeout_ms ({})",
            runtime.request_timeout_ms
        )));
    }

    Ok(())
}

fn validate_tools(tools: &ToolsConfig) -> Result<(), ConfigError> {
    if let Some(conflict) =
        tools.approval_required.iter().find(|name| tools.approval_exempt.contains(name))
    {
        return Err(ConfigError::Validation(format!(
            "tool `{conflict}` is listed in both tools.approval_required and tools.approval_exempt"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn parse_provider(value: &str) -> Result<ProviderId, ConfigError> {
    ProviderId::parse(value).ok_or_else(|| {
        ConfigError::Validation(format!(
            "runtime.default_provider `{}` is not a canonical provider id",
            value.trim()
        ))
    })
}

fn non_blank_secret(value: String) -> Option<SecretString> {
    (!value.trim().is_empty()).then(|| SecretString::from(value))
}

fn normalize_tool_names(names: Vec<String>) -> Vec<String> {
    names.into_iter().map(|name| name.trim().to_string()).filter(|name| !name.is_empty()).collect()
}

fn split_list(value: &str) -> Vec<String> {
    normalize_tool_names(value.split(',').map(str::to_string).collect())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    runtime: Option<RuntimePatch>,
    voice: Option<VoicePatch>,
    tools: Option<ToolsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimePatch {
    default_provider: Option<String>,
    legacy_api_key: Option<String>,
    request_timeout_ms: Option<u64>,
    probe_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct VoicePatch {
    default_provider: Option<String>,
    probe_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsPatch {
    autonomy_level: Option<AutonomyLevel>,
    approval_required: Option<Vec<String>>,
    approval_exempt: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
