use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_core::audit::{AuditContext, InMemoryAuditSink};
use relay_core::bindings::{
    BillingSource, BindingRequest, CapabilityMatrix, CredentialProfile, CredentialSource, EnvironmentKeys,
};
use relay_core::catalog::ProviderCatalog;
use relay_core::provider::ProviderId;
use relay_voice::gateway::FALLBACK_AUDIT_EVENT;
use relay_voice::{
    SynthesisRequest, SynthesizedAudio, Transcription, TranscriptionRequest, VoiceAdapterResolver,
    VoiceCredential, VoiceGateway, VoiceHealthStatus, VoiceProviderId,
};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(sink: &InMemoryAuditSink, probe_timeout: Duration) -> VoiceGateway {
    VoiceGateway::new(VoiceAdapterResolver::default(), Arc::new(sink.clone()), probe_timeout)
}

#[tokio::test]
async fn healthy_remote_provider_is_used_directly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/projects"))
        .and(header("authorization", "Token dg-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"projects": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/listen"))
        .and(header("content-type", "audio/wav"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": {"channels": [{"alternatives": [{"transcript": "book a table for two"}]}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sink = InMemoryAuditSink::default();
    let gateway = gateway(&sink, Duration::from_secs(2)).with_credential(
        VoiceProviderId::Deepgram,
        VoiceCredential::new("dg-key").with_endpoint(server.uri()),
    );
    let context = AuditContext::for_session("sess-1", "caller");

    let resolution = gateway.resolve(&context, Some("deepgram")).await;
    assert_eq!(resolution.provider(), VoiceProviderId::Deepgram);
    assert_eq!(resolution.health.status, VoiceHealthStatus::Healthy);

    let transcription = gateway
        .transcribe(&context, Some("deepgram"), &TranscriptionRequest::new(vec![1, 2, 3], "audio/wav"))
        .await
        .expect("transcription");
    assert_eq!(transcription, Transcription::Text { text: "book a table for two".to_string() });
    assert!(sink.events_of(FALLBACK_AUDIT_EVENT).is_empty());
}

#[tokio::test]
async fn rejected_probe_falls_back_and_keeps_probe_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/user"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let sink = InMemoryAuditSink::default();
    let gateway = gateway(&sink, Duration::from_secs(2)).with_credential(
        VoiceProviderId::ElevenLabs,
        VoiceCredential::new("xi-bad").with_endpoint(server.uri()),
    );
    let context = AuditContext::for_session("sess-2", "caller");

    let resolution = gateway.resolve(&context, Some("eleven_labs")).await;

    assert_eq!(resolution.provider(), VoiceProviderId::Browser);
    assert_eq!(resolution.health.provider, VoiceProviderId::ElevenLabs);
    assert_eq!(resolution.health.status, VoiceHealthStatus::Degraded);
    assert_eq!(resolution.health.reason.as_deref(), Some("auth_rejected (401)"));
    assert_eq!(resolution.health.fallback_provider, Some(VoiceProviderId::Browser));

    let events = sink.events_of(FALLBACK_AUDIT_EVENT);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].metadata["reason"], "auth_rejected (401)");
}

#[tokio::test]
async fn slow_probe_is_cut_off_by_the_gateway_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let sink = InMemoryAuditSink::default();
    let gateway = gateway(&sink, Duration::from_millis(50)).with_credential(
        VoiceProviderId::OpenAi,
        VoiceCredential::new("sk-voice").with_endpoint(server.uri()),
    );
    let context = AuditContext::for_session("sess-3", "caller");

    let audio = gateway
        .synthesize(&context, Some("openai_realtime"), &SynthesisRequest::new("hello"))
        .await
        .expect("local synthesis");

    assert_eq!(audio, SynthesizedAudio::RequiresLocalProcessing);
    let events = sink.events_of(FALLBACK_AUDIT_EVENT);
    assert_eq!(events[0].metadata["health_status"], "offline");
    assert_eq!(events[0].metadata["reason"], "probe_timeout");
}

#[tokio::test]
async fn recovery_is_picked_up_on_the_next_call_of_the_same_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .and(body_json(json!({"input": "welcome back", "model": "tts-1", "voice": "alloy"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(vec![0xFF, 0xFB, 0x90]),
        )
        .mount(&server)
        .await;

    let sink = InMemoryAuditSink::default();
    let gateway = gateway(&sink, Duration::from_secs(2)).with_credential(
        VoiceProviderId::OpenAi,
        VoiceCredential::new("sk-voice").with_endpoint(server.uri()),
    );
    let context = AuditContext::for_session("sess-4", "caller");

    let session = gateway.open_session(&context, Some("openai"), "sess-4").await.expect("open");
    assert_eq!(session.provider, VoiceProviderId::Browser);

    let audio = gateway
        .synthesize(&context, Some("openai"), &SynthesisRequest::new("welcome back"))
        .await
        .expect("remote synthesis");

    assert_eq!(
        audio,
        SynthesizedAudio::Audio { content_type: "audio/mpeg".to_string(), bytes: vec![0xFF, 0xFB, 0x90] }
    );
    assert_eq!(sink.events_of(FALLBACK_AUDIT_EVENT).len(), 1);
}

#[tokio::test]
async fn org_profile_binding_reaches_the_openai_voice_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("authorization", "Bearer sk-org-voice"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .and(header("authorization", "Bearer sk-org-voice"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(vec![0x49, 0x44, 0x33]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let catalog = ProviderCatalog::builtin().expect("catalog");
    let profiles = vec![CredentialProfile {
        id: "org-voice".to_string(),
        provider: ProviderId::OpenAi,
        label: "voice team".to_string(),
        endpoint_override: Some(server.uri()),
        credential_source: CredentialSource::Manual,
        billing_source: BillingSource::ByoKey,
        secret: SecretString::from("sk-org-voice".to_string()),
        capabilities: CapabilityMatrix::default(),
        enabled: true,
        priority: Some(1),
        cooldown_until: None,
        failure_count: 0,
        last_failure_reason: None,
    }];
    let environment =
        EnvironmentKeys::default().with_credential(ProviderId::OpenAi, "OPENAI_API_KEY", "sk-platform");
    let request = BindingRequest::new(&profiles, &environment, Utc::now());

    let sink = InMemoryAuditSink::default();
    let gateway = gateway(&sink, Duration::from_secs(2)).with_bindings(&catalog, &request);
    let context = AuditContext::for_session("sess-5", "caller");

    let audio = gateway
        .synthesize(&context, Some("openai"), &SynthesisRequest::new("hi"))
        .await
        .expect("remote synthesis");

    assert_eq!(
        audio,
        SynthesizedAudio::Audio { content_type: "audio/mpeg".to_string(), bytes: vec![0x49, 0x44, 0x33] }
    );
    assert!(sink.events_of(FALLBACK_AUDIT_EVENT).is_empty());
}
