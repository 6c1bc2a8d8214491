use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use relay_core::bindings::{resolve_first_binding, BindingRequest, CredentialProfile, EnvironmentKeys};
use relay_core::catalog::ProviderCatalog;
use relay_core::config::AppConfig;
use tracing::{debug, warn};

use crate::adapter::{
    SynthesisRequest, SynthesizedAudio, Transcription, TranscriptionRequest, VoiceCredential,
    VoiceError, VoiceProviderHealth, VoiceSession,
};
use crate::provider::{VoiceCredentialSource, VoiceProviderId, REMOTE_VOICE_SPECS};
use crate::resolver::{VoiceAdapterResolver, VoiceResolution};

pub const FALLBACK_AUDIT_EVENT: &str = "voice.provider_fallback";

/// Call site for voice traffic.
///
/// Every operation resolves its adapter afresh, so a provider that recovers
/// is picked up on the next call without restarting the session. The probe
/// is bounded by `probe_timeout`; expiry counts as an offline provider.
pub struct VoiceGateway {
    resolver: VoiceAdapterResolver,
    credentials: HashMap<VoiceProviderId, VoiceCredential>,
    audit: Arc<dyn AuditSink>,
    default_provider: String,
    probe_timeout: Duration,
}

impl VoiceGateway {
    pub fn new(resolver: VoiceAdapterResolver, audit: Arc<dyn AuditSink>, probe_timeout: Duration) -> Self {
        Self {
            resolver,
            credentials: HashMap::new(),
            audit,
            default_provider: VoiceProviderId::Browser.as_str().to_string(),
            probe_timeout,
        }
    }

    /// Builds the production gateway: binding-backed providers take the
    /// first resolved binding, voice-only providers read their own variable.
    pub fn from_config(
        config: &AppConfig,
        catalog: &ProviderCatalog,
        profiles: &[CredentialProfile],
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder().build()?;
        let mut gateway = Self::new(
            VoiceAdapterResolver::new(client),
            audit,
            Duration::from_millis(config.voice.probe_timeout_ms),
        );
        gateway.default_provider = config.voice.default_provider.clone();

        let environment = EnvironmentKeys::from_env(catalog);
        let request = BindingRequest::new(profiles, &environment, Utc::now())
            .with_legacy_key(config.runtime.legacy_api_key.as_ref())
            .with_default_provider(config.runtime.default_provider);
        Ok(gateway.with_bindings(catalog, &request).with_env_credentials(|key| env::var(key).ok()))
    }

    pub fn with_credential(mut self, provider: VoiceProviderId, credential: VoiceCredential) -> Self {
        self.credentials.insert(provider, credential);
        self
    }

    /// Takes the head binding for every voice provider that shares a chat
    /// provider's credential. Cooldown, priority and endpoint overrides are
    /// already applied by the binding resolver.
    pub fn with_bindings(mut self, catalog: &ProviderCatalog, request: &BindingRequest<'_>) -> Self {
        for spec in &REMOTE_VOICE_SPECS {
            let VoiceCredentialSource::Binding(provider) = spec.credential else {
                continue;
            };
            let scoped = request.clone().for_provider(Some(provider));
            if let Some(binding) = resolve_first_binding(catalog, &scoped) {
                debug!(
                    event_name = "voice.credential.bound",
                    voice_provider = %spec.provider,
                    profile_id = %binding.profile_id,
                    binding_source = ?binding.source,
                    "voice credential taken from binding"
                );
                self.credentials.insert(spec.provider, VoiceCredential::from(&binding));
            }
        }
        self
    }

    /// Reads each voice-only provider's credential variable through `lookup`.
    pub fn with_env_credentials<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for spec in &REMOTE_VOICE_SPECS {
            let VoiceCredentialSource::Env(key) = spec.credential else {
                continue;
            };
            if let Some(secret) = lookup(key).filter(|value| !value.trim().is_empty()) {
                self.credentials.entry(spec.provider).or_insert_with(|| VoiceCredential::new(secret));
            }
        }
        self
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Resolves the adapter for `requested` (or the configured default) and
    /// records any substitution to the audit sink.
    pub async fn resolve(&self, context: &AuditContext, requested: Option<&str>) -> VoiceResolution {
        let requested = requested.unwrap_or(&self.default_provider);
        let provider = VoiceProviderId::normalize(requested);
        let credential = self.credentials.get(&provider);

        let resolution =
            match tokio::time::timeout(self.probe_timeout, self.resolver.resolve_adapter(requested, credential))
                .await
            {
                Ok(resolution) => resolution,
                Err(_) => VoiceResolution::local_fallback(
                    provider,
                    VoiceProviderHealth::offline(provider, "probe_timeout"),
                ),
            };

        if resolution.is_fallback() {
            self.record_fallback(context, &resolution);
        }
        resolution
    }

    fn record_fallback(&self, context: &AuditContext, resolution: &VoiceResolution) {
        let fallback = resolution.provider();
        let reason = resolution.health.reason.as_deref().unwrap_or("unhealthy");
        warn!(
            event_name = "voice.adapter.fallback",
            correlation_id = %context.correlation_id,
            session_id = context.session_id.as_deref().unwrap_or(""),
            requested_provider = %resolution.requested,
            fallback_provider = %fallback,
            health_status = resolution.health.status.as_str(),
            reason,
            "voice provider substituted"
        );
        self.audit.emit(
            context
                .event(FALLBACK_AUDIT_EVENT, AuditCategory::Voice, AuditOutcome::Degraded)
                .with_metadata("requested_provider", resolution.requested.as_str())
                .with_metadata("fallback_provider", fallback.as_str())
                .with_metadata("health_status", resolution.health.status.as_str())
                .with_metadata("reason", reason),
        );
    }

    pub async fn open_session(
        &self,
        context: &AuditContext,
        requested: Option<&str>,
        session_id: &str,
    ) -> Result<VoiceSession, VoiceError> {
        self.resolve(context, requested).await.adapter.open_session(session_id).await
    }

    pub async fn close_session(
        &self,
        context: &AuditContext,
        requested: Option<&str>,
        session: &VoiceSession,
    ) -> Result<(), VoiceError> {
        self.resolve(context, requested).await.adapter.close_session(session).await
    }

    pub async fn transcribe(
        &self,
        context: &AuditContext,
        requested: Option<&str>,
        request: &TranscriptionRequest,
    ) -> Result<Transcription, VoiceError> {
        self.resolve(context, requested).await.adapter.transcribe(request).await
    }

    pub async fn synthesize(
        &self,
        context: &AuditContext,
        requested: Option<&str>,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedAudio, VoiceError> {
        self.resolve(context, requested).await.adapter.synthesize(request).await
    }
}
