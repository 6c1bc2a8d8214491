use std::time::Duration;

use chrono::Utc;
use relay_agent::HttpCredentialProbe;
use relay_core::bindings::{
    BillingSource, BindingSource, CapabilityMatrix, CredentialProfile, CredentialSource,
    FallbackMetadata, ProbeOutcome, ResolvedBinding,
};
use relay_core::provider::ProviderId;
use secrecy::SecretString;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn binding(provider: ProviderId, endpoint: String, secret: &str) -> ResolvedBinding {
    ResolvedBinding {
        provider,
        profile_id: "p-probe".to_string(),
        secret: SecretString::from(secret.to_string()),
        endpoint,
        priority: 0,
        source: BindingSource::OrgProfile,
        credential_source: CredentialSource::Manual,
        billing_source: BillingSource::ByoKey,
        fallback: FallbackMetadata::default(),
    }
}

fn profile() -> CredentialProfile {
    CredentialProfile {
        id: "p-probe".to_string(),
        provider: ProviderId::OpenAi,
        label: "probe".to_string(),
        endpoint_override: None,
        credential_source: CredentialSource::Manual,
        billing_source: BillingSource::ByoKey,
        secret: SecretString::from("sk-test".to_string()),
        capabilities: CapabilityMatrix::default(),
        enabled: true,
        priority: Some(0),
        cooldown_until: None,
        failure_count: 2,
        last_failure_reason: Some("timeout".to_string()),
    }
}

#[tokio::test]
async fn healthy_probe_sends_bearer_auth_and_clears_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let probe = HttpCredentialProbe::new(Duration::from_secs(2)).expect("client");
    let binding = binding(ProviderId::OpenAi, format!("{}/v1", server.uri()), "sk-test");

    let updated = probe.check_profile(&profile(), &binding, Utc::now()).await;

    assert_eq!(updated.failure_count, 0);
    assert!(updated.cooldown_until.is_none());
}

#[tokio::test]
async fn pinned_version_headers_are_sent_for_message_blocks_family() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("x-api-key", "sk-ant"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let probe = HttpCredentialProbe::new(Duration::from_secs(2)).expect("client");
    let outcome = probe.probe(&binding(ProviderId::Anthropic, server.uri(), "sk-ant")).await;

    assert_eq!(outcome, ProbeOutcome::Healthy);
}

#[tokio::test]
async fn rejected_probe_is_classified_and_starts_cooldown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({"error": {"message": "Incorrect API key provided"}})),
        )
        .mount(&server)
        .await;

    let probe = HttpCredentialProbe::new(Duration::from_secs(2)).expect("client");
    let now = Utc::now();
    let updated =
        probe.check_profile(&profile(), &binding(ProviderId::OpenAi, server.uri(), "sk-bad"), now).await;

    assert_eq!(updated.failure_count, 3);
    assert_eq!(updated.last_failure_reason.as_deref(), Some("auth (401)"));
    assert!(updated.in_cooldown(now));
}

#[tokio::test]
async fn slow_endpoint_fails_fast_with_timeout_reason() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let probe = HttpCredentialProbe::new(Duration::from_millis(50)).expect("client");
    let outcome = probe.probe(&binding(ProviderId::Groq, server.uri(), "gsk")).await;

    assert_eq!(outcome, ProbeOutcome::Failed { reason: "probe timed out".to_string() });
}
