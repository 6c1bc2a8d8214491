//! Credential binding resolution.
//!
//! Turns stored org profiles, an optional legacy global key, and
//! environment-sourced keys into a priority-ordered, deduplicated list of
//! bindings. Resolution is pure: no I/O, no logging side effects beyond
//! tracing, safe to call concurrently.

mod environment;
mod health;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::catalog::ProviderCatalog;
use crate::provider::{ProviderId, WireProtocol, DEFAULT_PROVIDER};

pub use environment::EnvironmentKeys;
pub use health::{record_probe_outcome, ProbeOutcome, BASE_COOLDOWN_SECS, MAX_COOLDOWN_SECS};

pub const LEGACY_PRIORITY: u32 = 900;
pub const ENVIRONMENT_PRIORITY_BASE: u32 = 1000;
/// Org profiles always sort ahead of legacy and environment tiers.
pub const MAX_PROFILE_PRIORITY: u32 = LEGACY_PRIORITY - 1;

pub const LEGACY_PROFILE_ID: &str = "legacy";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    Manual,
    Imported,
    OAuth,
    Environment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingSource {
    Platform,
    #[serde(rename = "bring_your_own_key")]
    ByoKey,
    Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityMatrix {
    pub text: bool,
    pub vision: bool,
    pub audio_in: bool,
    pub audio_out: bool,
    pub tools: bool,
    pub json: bool,
}

impl Default for CapabilityMatrix {
    fn default() -> Self {
        Self { text: true, vision: false, audio_in: false, audio_out: false, tools: true, json: true }
    }
}

/// A stored, provider-scoped secret plus its configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct CredentialProfile {
    pub id: String,
    pub provider: ProviderId,
    pub label: String,
    #[serde(default)]
    pub endpoint_override: Option<String>,
    pub credential_source: CredentialSource,
    pub billing_source: BillingSource,
    #[serde(deserialize_with = "deserialize_secret")]
    pub secret: SecretString,
    #[serde(default)]
    pub capabilities: CapabilityMatrix,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub cooldown_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub last_failure_reason: Option<String>,
}

impl CredentialProfile {
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|until| until > now).unwrap_or(false)
    }
}

fn enabled_by_default() -> bool {
    true
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingSource {
    OrgProfile,
    LegacyKey,
    PlatformEnv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    PriorityFromListIndex,
    PriorityClamped,
    LegacyKeyDefaultProvider,
    EndpointOverrideUnsupported,
    EndpointFromEnvironment,
    EndpointFromCatalogDefault,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriorityFromListIndex => "priority_from_list_index",
            Self::PriorityClamped => "priority_clamped",
            Self::LegacyKeyDefaultProvider => "legacy_key_default_provider",
            Self::EndpointOverrideUnsupported => "endpoint_override_unsupported",
            Self::EndpointFromEnvironment => "endpoint_from_environment",
            Self::EndpointFromCatalogDefault => "endpoint_from_catalog_default",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackMetadata {
    pub used_fallback: bool,
    pub reasons: Vec<FallbackReason>,
}

impl FallbackMetadata {
    fn push(&mut self, reason: FallbackReason) {
        self.used_fallback = true;
        self.reasons.push(reason);
    }
}

/// A binding ready to authenticate a request. Deliberately not `Serialize`:
/// use [`strip_secret`] before handing it to anything client-observable.
#[derive(Clone, Debug)]
pub struct ResolvedBinding {
    pub provider: ProviderId,
    pub profile_id: String,
    pub secret: SecretString,
    pub endpoint: String,
    pub priority: u32,
    pub source: BindingSource,
    pub credential_source: CredentialSource,
    pub billing_source: BillingSource,
    pub fallback: FallbackMetadata,
}

/// Secret-free projection of a [`ResolvedBinding`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicBinding {
    pub provider: ProviderId,
    pub profile_id: String,
    pub endpoint: String,
    pub priority: u32,
    pub source: BindingSource,
    pub credential_source: CredentialSource,
    pub billing_source: BillingSource,
    pub fallback: FallbackMetadata,
}

pub fn strip_secret(binding: &ResolvedBinding) -> PublicBinding {
    PublicBinding {
        provider: binding.provider,
        profile_id: binding.profile_id.clone(),
        endpoint: binding.endpoint.clone(),
        priority: binding.priority,
        source: binding.source,
        credential_source: binding.credential_source,
        billing_source: binding.billing_source,
        fallback: binding.fallback.clone(),
    }
}

/// Inputs to one resolution pass.
#[derive(Clone, Debug)]
pub struct BindingRequest<'a> {
    pub profiles: &'a [CredentialProfile],
    pub legacy_key: Option<&'a SecretString>,
    pub environment: &'a EnvironmentKeys,
    pub target_provider: Option<ProviderId>,
    pub default_provider: ProviderId,
    pub now: DateTime<Utc>,
}

impl<'a> BindingRequest<'a> {
    pub fn new(
        profiles: &'a [CredentialProfile],
        environment: &'a EnvironmentKeys,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            profiles,
            legacy_key: None,
            environment,
            target_provider: None,
            default_provider: DEFAULT_PROVIDER,
            now,
        }
    }

    pub fn with_legacy_key(mut self, legacy_key: Option<&'a SecretString>) -> Self {
        self.legacy_key = legacy_key;
        self
    }

    pub fn for_provider(mut self, target_provider: Option<ProviderId>) -> Self {
        self.target_provider = target_provider;
        self
    }

    pub fn with_default_provider(mut self, default_provider: ProviderId) -> Self {
        self.default_provider = default_provider;
        self
    }
}

pub fn resolve_bindings(
    catalog: &ProviderCatalog,
    request: &BindingRequest<'_>,
) -> Vec<ResolvedBinding> {
    let mut candidates = Vec::new();

    for (index, profile) in request.profiles.iter().enumerate() {
        if !profile.enabled {
            continue;
        }
        if profile.in_cooldown(request.now) {
            debug!(
                event_name = "binding.resolve.profile_in_cooldown",
                provider = %profile.provider,
                profile_id = %profile.id,
                "skipping profile in cooldown"
            );
            continue;
        }
        if let Some(binding) = profile_binding(catalog, request.environment, index, profile) {
            candidates.push(binding);
        }
    }

    if let Some(secret) = request.legacy_key {
        if let Some(binding) =
            legacy_binding(catalog, request.environment, request.default_provider, secret)
        {
            candidates.push(binding);
        }
    }

    candidates.extend(environment_bindings(catalog, request.environment));

    let mut bindings = deduplicate(candidates);
    bindings.sort_by(|left, right| {
        left.priority
            .cmp(&right.priority)
            .then_with(|| left.provider.as_str().cmp(right.provider.as_str()))
            .then_with(|| left.profile_id.cmp(&right.profile_id))
    });

    if let Some(target) = request.target_provider {
        bindings.retain(|binding| binding.provider == target);
    }

    debug!(
        event_name = "binding.resolve.completed",
        target_provider = request.target_provider.map(|id| id.as_str()).unwrap_or("any"),
        binding_count = bindings.len(),
        "resolved credential bindings"
    );

    bindings
}

pub fn resolve_first_binding(
    catalog: &ProviderCatalog,
    request: &BindingRequest<'_>,
) -> Option<ResolvedBinding> {
    resolve_bindings(catalog, request).into_iter().next()
}

fn profile_binding(
    catalog: &ProviderCatalog,
    environment: &EnvironmentKeys,
    index: usize,
    profile: &CredentialProfile,
) -> Option<ResolvedBinding> {
    if !catalog.contains(profile.provider) {
        warn!(
            event_name = "binding.resolve.unknown_provider",
            provider = %profile.provider,
            profile_id = %profile.id,
            "profile references a provider missing from the catalog"
        );
        return None;
    }

    let mut fallback = FallbackMetadata::default();
    let nominal = match profile.priority {
        Some(priority) => priority,
        None => {
            fallback.push(FallbackReason::PriorityFromListIndex);
            u32::try_from(index).unwrap_or(u32::MAX)
        }
    };
    let priority = if nominal > MAX_PROFILE_PRIORITY {
        fallback.push(FallbackReason::PriorityClamped);
        MAX_PROFILE_PRIORITY
    } else {
        nominal
    };

    let endpoint = resolve_endpoint(
        catalog,
        environment,
        profile.provider,
        profile.endpoint_override.as_deref(),
        &mut fallback,
    )?;

    Some(ResolvedBinding {
        provider: profile.provider,
        profile_id: profile.id.clone(),
        secret: profile.secret.clone(),
        endpoint,
        priority,
        source: BindingSource::OrgProfile,
        credential_source: profile.credential_source,
        billing_source: profile.billing_source,
        fallback,
    })
}

fn legacy_binding(
    catalog: &ProviderCatalog,
    environment: &EnvironmentKeys,
    default_provider: ProviderId,
    secret: &SecretString,
) -> Option<ResolvedBinding> {
    let mut fallback = FallbackMetadata::default();
    fallback.push(FallbackReason::LegacyKeyDefaultProvider);
    let endpoint = resolve_endpoint(catalog, environment, default_provider, None, &mut fallback)?;

    Some(ResolvedBinding {
        provider: default_provider,
        profile_id: LEGACY_PROFILE_ID.to_string(),
        secret: secret.clone(),
        endpoint,
        priority: LEGACY_PRIORITY,
        source: BindingSource::LegacyKey,
        credential_source: CredentialSource::Manual,
        billing_source: BillingSource::ByoKey,
        fallback,
    })
}

fn environment_bindings(
    catalog: &ProviderCatalog,
    environment: &EnvironmentKeys,
) -> Vec<ResolvedBinding> {
    let mut bindings = Vec::new();
    let mut tier = ENVIRONMENT_PRIORITY_BASE;

    for descriptor in catalog.iter() {
        let Some((var, secret)) = environment.credential(descriptor.id) else {
            continue;
        };
        let mut fallback = FallbackMetadata::default();
        let Some(endpoint) =
            resolve_endpoint(catalog, environment, descriptor.id, None, &mut fallback)
        else {
            continue;
        };

        bindings.push(ResolvedBinding {
            provider: descriptor.id,
            profile_id: format!("env:{var}"),
            secret: secret.clone(),
            endpoint,
            priority: tier,
            source: BindingSource::PlatformEnv,
            credential_source: CredentialSource::Environment,
            billing_source: BillingSource::Platform,
            fallback,
        });
        tier += 1;
    }

    bindings
}

/// Explicit override, then the provider's environment default (compatible
/// family only), then the catalog default.
fn resolve_endpoint(
    catalog: &ProviderCatalog,
    environment: &EnvironmentKeys,
    provider: ProviderId,
    endpoint_override: Option<&str>,
    fallback: &mut FallbackMetadata,
) -> Option<String> {
    let descriptor = catalog.get(provider)?;

    if let Some(endpoint) = endpoint_override.map(str::trim).filter(|value| !value.is_empty()) {
        if descriptor.supports_custom_endpoint {
            return Some(endpoint.trim_end_matches('/').to_string());
        }
        fallback.push(FallbackReason::EndpointOverrideUnsupported);
    }

    let spec = provider.spec();
    if spec.capabilities.protocol == WireProtocol::ChatCompletions {
        if let Some(endpoint) = environment.endpoint(provider) {
            fallback.push(FallbackReason::EndpointFromEnvironment);
            return Some(endpoint.trim_end_matches('/').to_string());
        }
    }

    fallback.push(FallbackReason::EndpointFromCatalogDefault);
    Some(descriptor.default_endpoint.trim_end_matches('/').to_string())
}

fn deduplicate(candidates: Vec<ResolvedBinding>) -> Vec<ResolvedBinding> {
    let mut by_key: HashMap<(ProviderId, String), ResolvedBinding> = HashMap::new();

    for candidate in candidates {
        let key = (candidate.provider, candidate.profile_id.clone());
        match by_key.get(&key) {
            Some(existing) if existing.priority <= candidate.priority => {
                debug!(
                    event_name = "binding.resolve.shadowed",
                    provider = %candidate.provider,
                    profile_id = %candidate.profile_id,
                    kept_source = ?existing.source,
                    dropped_source = ?candidate.source,
                    "duplicate binding dropped"
                );
            }
            _ => {
                by_key.insert(key, candidate);
            }
        }
    }

    by_key.into_values().collect()
}
