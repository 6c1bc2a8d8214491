use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::{VoiceAdapter, VoiceCredential, VoiceError, VoiceProviderHealth};
use crate::local::BrowserVoiceAdapter;
use crate::provider::{VoiceProviderId, LOCAL_VOICE_PROVIDER};
use crate::remote::HttpVoiceAdapter;

/// The adapter to use for one call and the health record that chose it.
#[derive(Clone)]
pub struct VoiceResolution {
    pub requested: VoiceProviderId,
    pub adapter: Arc<dyn VoiceAdapter>,
    pub health: VoiceProviderHealth,
}

impl VoiceResolution {
    /// Substitutes the local adapter, keeping `health` as the reason.
    pub fn local_fallback(requested: VoiceProviderId, health: VoiceProviderHealth) -> Self {
        Self {
            requested,
            adapter: Arc::new(BrowserVoiceAdapter),
            health: health.with_fallback(LOCAL_VOICE_PROVIDER),
        }
    }

    pub fn provider(&self) -> VoiceProviderId {
        self.adapter.provider_id()
    }

    pub fn is_fallback(&self) -> bool {
        self.health.fallback_provider.is_some()
    }
}

impl fmt::Debug for VoiceResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceResolution")
            .field("requested", &self.requested)
            .field("adapter", &self.adapter.provider_id())
            .field("health", &self.health)
            .finish()
    }
}

/// Picks a voice backend for a request, substituting the local adapter
/// whenever the remote one cannot be built or fails its probe.
///
/// The probe is not bounded here; callers wrap resolution in their own
/// deadline (see [`crate::gateway::VoiceGateway`]).
#[derive(Clone, Debug, Default)]
pub struct VoiceAdapterResolver {
    client: reqwest::Client,
}

impl VoiceAdapterResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn resolve_adapter(
        &self,
        requested: &str,
        credential: Option<&VoiceCredential>,
    ) -> VoiceResolution {
        let provider = VoiceProviderId::normalize(requested);
        if provider.is_local() {
            debug!(event_name = "voice.resolve.local", requested, "local voice adapter selected");
            return VoiceResolution {
                requested: provider,
                adapter: Arc::new(BrowserVoiceAdapter),
                health: VoiceProviderHealth::healthy(provider),
            };
        }

        let adapter = match HttpVoiceAdapter::new(provider, credential, self.client.clone()) {
            Ok(adapter) => adapter,
            Err(VoiceError::MissingCredential { .. }) => {
                return VoiceResolution::local_fallback(
                    provider,
                    VoiceProviderHealth::degraded(provider, "missing_credential"),
                );
            }
            Err(error) => {
                return VoiceResolution::local_fallback(
                    provider,
                    VoiceProviderHealth::offline(provider, error.to_string()),
                );
            }
        };

        let health = adapter.probe_health().await;
        if !health.is_healthy() {
            return VoiceResolution::local_fallback(provider, health);
        }
        VoiceResolution { requested: provider, adapter: Arc::new(adapter), health }
    }
}

#[cfg(test)]
mod tests {
    use super::VoiceAdapterResolver;
    use crate::adapter::{VoiceCredential, VoiceHealthStatus};
    use crate::provider::VoiceProviderId;

    #[tokio::test]
    async fn missing_credential_degrades_to_browser() {
        let resolver = VoiceAdapterResolver::default();

        let resolution = resolver.resolve_adapter("elevenlabs", None).await;

        assert_eq!(resolution.provider(), VoiceProviderId::Browser);
        assert_eq!(resolution.requested, VoiceProviderId::ElevenLabs);
        assert_eq!(resolution.health.status, VoiceHealthStatus::Degraded);
        assert_eq!(resolution.health.reason.as_deref(), Some("missing_credential"));
        assert_eq!(resolution.health.fallback_provider, Some(VoiceProviderId::Browser));
    }

    #[tokio::test]
    async fn browser_and_unknown_requests_skip_probing() {
        let resolver = VoiceAdapterResolver::default();
        // Unroutable endpoint: any probe attempt would come back offline.
        let credential = VoiceCredential::new("k").with_endpoint("http://127.0.0.1:9");

        for requested in ["browser", "local", "not-a-provider"] {
            let resolution = resolver.resolve_adapter(requested, Some(&credential)).await;
            assert_eq!(resolution.provider(), VoiceProviderId::Browser);
            assert_eq!(resolution.health.status, VoiceHealthStatus::Healthy);
            assert!(!resolution.is_fallback());
        }
    }
}
