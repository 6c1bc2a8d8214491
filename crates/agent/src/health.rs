use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_core::bindings::{record_probe_outcome, CredentialProfile, ProbeOutcome, ResolvedBinding};
use relay_core::normalize::normalize_error;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, warn};

/// Validates a binding with a read-only `GET {endpoint}/models`.
///
/// The client-level timeout is the caller-imposed probe deadline; it should
/// be shorter than the deadline of the request the probe is guarding.
#[derive(Clone, Debug)]
pub struct HttpCredentialProbe {
    client: reqwest::Client,
}

impl HttpCredentialProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn probe(&self, binding: &ResolvedBinding) -> ProbeOutcome {
        let url = format!("{}/models", binding.endpoint.trim_end_matches('/'));
        let mut request = self.client.get(&url);
        for (name, value) in binding.provider.spec().auth_headers(binding.secret.expose_secret()) {
            request = request.header(name, value);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                let reason = if error.is_timeout() {
                    "probe timed out".to_string()
                } else {
                    format!("probe transport error: {}", without_url(&error))
                };
                warn!(
                    event_name = "binding.probe.transport_failed",
                    provider = %binding.provider,
                    profile_id = %binding.profile_id,
                    reason = %reason,
                    "credential probe failed before a response"
                );
                return ProbeOutcome::Failed { reason };
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(
                event_name = "binding.probe.healthy",
                provider = %binding.provider,
                profile_id = %binding.profile_id,
                "credential probe succeeded"
            );
            return ProbeOutcome::Healthy;
        }

        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        let normalized = normalize_error(binding.provider, &body, Some(status.as_u16()));
        warn!(
            event_name = "binding.probe.rejected",
            provider = %binding.provider,
            profile_id = %binding.profile_id,
            status = status.as_u16(),
            error_class = normalized.class.as_str(),
            "credential probe rejected"
        );
        ProbeOutcome::Failed { reason: format!("{} ({})", normalized.class.as_str(), status.as_u16()) }
    }

    /// Probes and folds the outcome into the profile's health metadata.
    pub async fn check_profile(
        &self,
        profile: &CredentialProfile,
        binding: &ResolvedBinding,
        now: DateTime<Utc>,
    ) -> CredentialProfile {
        let outcome = self.probe(binding).await;
        record_probe_outcome(profile, &outcome, now)
    }
}

/// reqwest errors embed the URL; endpoints may carry tokens in query strings.
fn without_url(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    if let Some(url) = error.url() {
        message = message.replace(url.as_str(), "<endpoint>");
    }
    message
}
