//! Canonical provider table.
//!
//! Every per-provider fact the runtime needs (default endpoint, aliases,
//! credential environment keys, auth scheme, wire protocol and tool-calling
//! limits) lives in [`PROVIDER_SPECS`]. Adding a provider is a new row here,
//! never a new `match` arm elsewhere.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
    #[serde(rename = "groq")]
    Groq,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "xai")]
    Xai,
    #[serde(rename = "together")]
    Together,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "ollama")]
    Ollama,
}

/// Provider used when a token or legacy key carries no provider of its own.
pub const DEFAULT_PROVIDER: ProviderId = ProviderId::OpenAi;

impl ProviderId {
    pub const ALL: [ProviderId; 10] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::Google,
        Self::Groq,
        Self::Mistral,
        Self::DeepSeek,
        Self::Xai,
        Self::Together,
        Self::OpenRouter,
        Self::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Groq => "groq",
            Self::Mistral => "mistral",
            Self::DeepSeek => "deepseek",
            Self::Xai => "xai",
            Self::Together => "together",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
        }
    }

    /// Parses a canonical id only. Aliases go through `normalize::detect_provider`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|id| id.as_str() == value)
    }

    pub fn spec(&self) -> &'static ProviderSpec {
        provider_spec(*self)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| format!("unknown provider id `{}`", value.trim()))
    }
}

/// Where a provider's model list comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Catalog,
    ProviderApi,
    Manual,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::ProviderApi => "provider_api",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "catalog" => Some(Self::Catalog),
            "provider_api" => Some(Self::ProviderApi),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Request/response shape spoken on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireProtocol {
    ChatCompletions,
    MessageBlocks,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    /// Key in a vendor header plus a pinned API version header.
    KeyWithVersion {
        key_header: &'static str,
        version_header: &'static str,
        version: &'static str,
    },
    /// Bearer token plus a secondary vendor header.
    BearerWithVendorHeader { header: &'static str, value: &'static str },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderCapabilities {
    pub supports_tool_calling: bool,
    pub max_tool_rounds: u8,
    pub requires_tool_call_id: bool,
    pub protocol: WireProtocol,
    pub supports_structured_output: bool,
    /// Aggregator routers address models as `<vendor>/<model>` and need the prefix.
    pub keeps_model_prefix: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct ProviderSpec {
    pub id: ProviderId,
    pub label: &'static str,
    pub default_endpoint: &'static str,
    pub discovery: DiscoverySource,
    pub supports_custom_endpoint: bool,
    pub aliases: &'static [&'static str],
    /// First entry is canonical; the rest are historical names still honored.
    pub credential_env_keys: &'static [&'static str],
    /// Only set for the OpenAI-compatible family.
    pub endpoint_env_key: Option<&'static str>,
    pub auth: AuthScheme,
    pub capabilities: ProviderCapabilities,
}

impl ProviderSpec {
    pub fn auth_headers(&self, secret: &str) -> Vec<(&'static str, String)> {
        match self.auth {
            AuthScheme::Bearer => vec![("authorization", format!("Bearer {secret}"))],
            AuthScheme::KeyWithVersion { key_header, version_header, version } => {
                vec![(key_header, secret.to_string()), (version_header, version.to_string())]
            }
            AuthScheme::BearerWithVendorHeader { header, value } => {
                vec![("authorization", format!("Bearer {secret}")), (header, value.to_string())]
            }
        }
    }
}

const CHAT_COMPLETIONS_FULL: ProviderCapabilities = ProviderCapabilities {
    supports_tool_calling: true,
    max_tool_rounds: 8,
    requires_tool_call_id: true,
    protocol: WireProtocol::ChatCompletions,
    supports_structured_output: true,
    keeps_model_prefix: false,
};

pub const PROVIDER_SPECS: &[ProviderSpec] = &[
    ProviderSpec {
        id: ProviderId::OpenAi,
        label: "OpenAI",
        default_endpoint: "https://api.openai.com/v1",
        discovery: DiscoverySource::ProviderApi,
        supports_custom_endpoint: true,
        aliases: &["gpt", "chatgpt", "open_ai", "o1", "o3"],
        credential_env_keys: &["OPENAI_API_KEY"],
        endpoint_env_key: Some("OPENAI_BASE_URL"),
        auth: AuthScheme::Bearer,
        capabilities: CHAT_COMPLETIONS_FULL,
    },
    ProviderSpec {
        id: ProviderId::Anthropic,
        label: "Anthropic",
        default_endpoint: "https://api.anthropic.com/v1",
        discovery: DiscoverySource::Catalog,
        supports_custom_endpoint: false,
        aliases: &["claude"],
        credential_env_keys: &["ANTHROPIC_API_KEY", "CLAUDE_API_KEY"],
        endpoint_env_key: None,
        auth: AuthScheme::KeyWithVersion {
            key_header: "x-api-key",
            version_header: "anthropic-version",
            version: "2023-06-01",
        },
        capabilities: ProviderCapabilities {
            supports_tool_calling: true,
            max_tool_rounds: 8,
            requires_tool_call_id: true,
            protocol: WireProtocol::MessageBlocks,
            supports_structured_output: false,
            keeps_model_prefix: false,
        },
    },
    ProviderSpec {
        id: ProviderId::Google,
        label: "Google Gemini",
        default_endpoint: "https://generativelanguage.googleapis.com/v1beta/openai",
        discovery: DiscoverySource::Catalog,
        supports_custom_endpoint: false,
        aliases: &["gemini", "google_ai", "vertex"],
        credential_env_keys: &["GOOGLE_API_KEY", "GEMINI_API_KEY", "GOOGLE_GENERATIVE_AI_API_KEY"],
        endpoint_env_key: None,
        auth: AuthScheme::Bearer,
        capabilities: ProviderCapabilities {
            max_tool_rounds: 5,
            requires_tool_call_id: false,
            ..CHAT_COMPLETIONS_FULL
        },
    },
    ProviderSpec {
        id: ProviderId::Groq,
        label: "Groq",
        default_endpoint: "https://api.groq.com/openai/v1",
        discovery: DiscoverySource::ProviderApi,
        supports_custom_endpoint: true,
        aliases: &[],
        credential_env_keys: &["GROQ_API_KEY"],
        endpoint_env_key: Some("GROQ_BASE_URL"),
        auth: AuthScheme::Bearer,
        capabilities: ProviderCapabilities { max_tool_rounds: 5, ..CHAT_COMPLETIONS_FULL },
    },
    ProviderSpec {
        id: ProviderId::Mistral,
        label: "Mistral",
        default_endpoint: "https://api.mistral.ai/v1",
        discovery: DiscoverySource::ProviderApi,
        supports_custom_endpoint: true,
        aliases: &["mistralai", "mixtral", "codestral"],
        credential_env_keys: &["MISTRAL_API_KEY"],
        endpoint_env_key: Some("MISTRAL_BASE_URL"),
        auth: AuthScheme::Bearer,
        capabilities: ProviderCapabilities { max_tool_rounds: 5, ..CHAT_COMPLETIONS_FULL },
    },
    ProviderSpec {
        id: ProviderId::DeepSeek,
        label: "DeepSeek",
        default_endpoint: "https://api.deepseek.com/v1",
        discovery: DiscoverySource::Catalog,
        supports_custom_endpoint: true,
        aliases: &["deep_seek"],
        credential_env_keys: &["DEEPSEEK_API_KEY"],
        endpoint_env_key: Some("DEEPSEEK_BASE_URL"),
        auth: AuthScheme::Bearer,
        capabilities: ProviderCapabilities { max_tool_rounds: 4, ..CHAT_COMPLETIONS_FULL },
    },
    ProviderSpec {
        id: ProviderId::Xai,
        label: "xAI",
        default_endpoint: "https://api.x.ai/v1",
        discovery: DiscoverySource::Catalog,
        supports_custom_endpoint: true,
        aliases: &["grok", "x-ai", "x_ai"],
        credential_env_keys: &["XAI_API_KEY"],
        endpoint_env_key: Some("XAI_BASE_URL"),
        auth: AuthScheme::Bearer,
        capabilities: ProviderCapabilities { max_tool_rounds: 5, ..CHAT_COMPLETIONS_FULL },
    },
    ProviderSpec {
        id: ProviderId::Together,
        label: "Together AI",
        default_endpoint: "https://api.together.xyz/v1",
        discovery: DiscoverySource::ProviderApi,
        supports_custom_endpoint: true,
        aliases: &["togetherai", "together_ai"],
        credential_env_keys: &["TOGETHER_API_KEY"],
        endpoint_env_key: Some("TOGETHER_BASE_URL"),
        auth: AuthScheme::Bearer,
        capabilities: ProviderCapabilities {
            max_tool_rounds: 3,
            requires_tool_call_id: false,
            supports_structured_output: false,
            ..CHAT_COMPLETIONS_FULL
        },
    },
    ProviderSpec {
        id: ProviderId::OpenRouter,
        label: "OpenRouter",
        default_endpoint: "https://openrouter.ai/api/v1",
        discovery: DiscoverySource::ProviderApi,
        supports_custom_endpoint: false,
        aliases: &["open_router"],
        credential_env_keys: &["OPENROUTER_API_KEY"],
        endpoint_env_key: None,
        auth: AuthScheme::BearerWithVendorHeader { header: "x-title", value: "Relay" },
        capabilities: ProviderCapabilities {
            max_tool_rounds: 5,
            keeps_model_prefix: true,
            ..CHAT_COMPLETIONS_FULL
        },
    },
    ProviderSpec {
        id: ProviderId::Ollama,
        label: "Ollama",
        default_endpoint: "http://localhost:11434/v1",
        discovery: DiscoverySource::Manual,
        supports_custom_endpoint: true,
        aliases: &["ollama_local", "llama"],
        credential_env_keys: &["OLLAMA_API_KEY"],
        endpoint_env_key: Some("OLLAMA_BASE_URL"),
        auth: AuthScheme::Bearer,
        capabilities: ProviderCapabilities {
            max_tool_rounds: 3,
            requires_tool_call_id: false,
            ..CHAT_COMPLETIONS_FULL
        },
    },
];

pub fn provider_spec(id: ProviderId) -> &'static ProviderSpec {
    // PROVIDER_SPECS has exactly one row per ProviderId, in ProviderId::ALL order.
    let index = ProviderId::ALL.iter().position(|candidate| *candidate == id).unwrap_or(0);
    &PROVIDER_SPECS[index]
}

pub fn capabilities(id: ProviderId) -> ProviderCapabilities {
    provider_spec(id).capabilities
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{capabilities, provider_spec, ProviderId, WireProtocol, PROVIDER_SPECS};

    #[test]
    fn table_has_one_row_per_provider_in_declaration_order() {
        assert_eq!(PROVIDER_SPECS.len(), ProviderId::ALL.len());
        for (row, id) in PROVIDER_SPECS.iter().zip(ProviderId::ALL) {
            assert_eq!(row.id, id, "row for {id} is out of order");
            assert!(!row.label.is_empty());
            assert!(!row.default_endpoint.is_empty());
            assert!(!row.credential_env_keys.is_empty());
        }
    }

    #[test]
    fn aliases_are_unique_across_providers() {
        let mut seen = HashSet::new();
        for row in PROVIDER_SPECS {
            for alias in row.aliases {
                assert!(seen.insert(*alias), "alias `{alias}` registered twice");
                assert!(ProviderId::parse(alias).is_none(), "alias `{alias}` shadows a canonical id");
            }
        }
    }

    #[test]
    fn canonical_ids_round_trip_through_parse() {
        for id in ProviderId::ALL {
            assert_eq!(ProviderId::parse(id.as_str()), Some(id));
            assert_eq!(provider_spec(id).id, id);
        }
        assert_eq!(ProviderId::parse("  OpenAI "), Some(ProviderId::OpenAi));
        assert_eq!(ProviderId::parse("claude"), None);
    }

    #[test]
    fn only_anthropic_speaks_message_blocks() {
        for id in ProviderId::ALL {
            let expected = if id == ProviderId::Anthropic {
                WireProtocol::MessageBlocks
            } else {
                WireProtocol::ChatCompletions
            };
            assert_eq!(capabilities(id).protocol, expected, "{id}");
        }
    }

    #[test]
    fn auth_headers_follow_scheme() {
        let bearer = provider_spec(ProviderId::OpenAi).auth_headers("sk-1");
        assert_eq!(bearer, vec![("authorization", "Bearer sk-1".to_string())]);

        let pinned = provider_spec(ProviderId::Anthropic).auth_headers("sk-ant");
        assert_eq!(pinned[0], ("x-api-key", "sk-ant".to_string()));
        assert_eq!(pinned[1], ("anthropic-version", "2023-06-01".to_string()));

        let vendor = provider_spec(ProviderId::OpenRouter).auth_headers("sk-or");
        assert_eq!(vendor.len(), 2);
        assert_eq!(vendor[0].1, "Bearer sk-or");
        assert_eq!(vendor[1].0, "x-title");
    }

    #[test]
    fn historical_env_aliases_are_honored_for_two_providers() {
        let with_aliases: Vec<_> =
            PROVIDER_SPECS.iter().filter(|row| row.credential_env_keys.len() > 1).collect();
        assert_eq!(with_aliases.len(), 2);
        assert!(provider_spec(ProviderId::Google).credential_env_keys.contains(&"GEMINI_API_KEY"));
        assert!(
            provider_spec(ProviderId::Anthropic).credential_env_keys.contains(&"CLAUDE_API_KEY")
        );
    }
}
