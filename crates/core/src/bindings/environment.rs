use std::collections::HashMap;
use std::env;

use secrecy::SecretString;

use crate::catalog::ProviderCatalog;
use crate::provider::ProviderId;

/// Platform credentials and endpoint defaults read from the process environment.
#[derive(Clone, Debug, Default)]
pub struct EnvironmentKeys {
    credentials: HashMap<ProviderId, (String, SecretString)>,
    endpoints: HashMap<ProviderId, String>,
}

impl EnvironmentKeys {
    pub fn from_env(catalog: &ProviderCatalog) -> Self {
        Self::from_lookup(catalog, |key| env::var(key).ok())
    }

    /// Reads one key per catalog provider, trying the canonical variable name
    /// before its historical aliases.
    pub fn from_lookup<F>(catalog: &ProviderCatalog, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut keys = Self::default();

        for descriptor in catalog.iter() {
            let spec = descriptor.id.spec();
            let credential = spec
                .credential_env_keys
                .iter()
                .find_map(|var| read(var).map(|value| (var.to_string(), value)));
            if let Some((var, value)) = credential {
                keys.credentials.insert(descriptor.id, (var, SecretString::from(value)));
            }
            if let Some(endpoint) = spec.endpoint_env_key.and_then(|var| read(var)) {
                keys.endpoints.insert(descriptor.id, endpoint.trim().to_string());
            }
        }

        keys
    }

    pub fn with_credential(
        mut self,
        provider: ProviderId,
        var: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.credentials.insert(provider, (var.into(), SecretString::from(secret.into())));
        self
    }

    pub fn with_endpoint(mut self, provider: ProviderId, endpoint: impl Into<String>) -> Self {
        self.endpoints.insert(provider, endpoint.into());
        self
    }

    /// Variable name and secret for a provider, if one was found.
    pub fn credential(&self, provider: ProviderId) -> Option<(&str, &SecretString)> {
        self.credentials.get(&provider).map(|(var, secret)| (var.as_str(), secret))
    }

    pub fn endpoint(&self, provider: ProviderId) -> Option<&str> {
        self.endpoints.get(&provider).map(String::as_str)
    }

    pub fn has_credential(&self, provider: ProviderId) -> bool {
        self.credentials.contains_key(&provider)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::EnvironmentKeys;
    use crate::catalog::ProviderCatalog;
    use crate::provider::ProviderId;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn canonical_variable_wins_over_historical_alias() {
        let catalog = ProviderCatalog::builtin().expect("catalog");
        let keys = EnvironmentKeys::from_lookup(
            &catalog,
            lookup(&[("GEMINI_API_KEY", "old"), ("GOOGLE_API_KEY", "new")]),
        );

        let (var, secret) = keys.credential(ProviderId::Google).expect("google key");
        assert_eq!(var, "GOOGLE_API_KEY");
        assert_eq!(secret.expose_secret(), "new");
    }

    #[test]
    fn historical_alias_is_used_when_canonical_is_absent_or_blank() {
        let catalog = ProviderCatalog::builtin().expect("catalog");
        let keys = EnvironmentKeys::from_lookup(
            &catalog,
            lookup(&[("ANTHROPIC_API_KEY", "  "), ("CLAUDE_API_KEY", "sk-ant")]),
        );

        assert_eq!(keys.credential(ProviderId::Anthropic).map(|(var, _)| var), Some("CLAUDE_API_KEY"));
        assert!(!keys.has_credential(ProviderId::OpenAi));
    }

    #[test]
    fn endpoint_defaults_are_read_for_compatible_family() {
        let catalog = ProviderCatalog::builtin().expect("catalog");
        let keys = EnvironmentKeys::from_lookup(
            &catalog,
            lookup(&[("OLLAMA_BASE_URL", " http://gpu:11434/v1 ")]),
        );

        assert_eq!(keys.endpoint(ProviderId::Ollama), Some("http://gpu:11434/v1"));
        assert_eq!(keys.endpoint(ProviderId::Anthropic), None);
    }
}
