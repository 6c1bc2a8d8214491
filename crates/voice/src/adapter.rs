use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::bindings::ResolvedBinding;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::VoiceProviderId;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("voice provider `{provider}` requires a credential")]
    MissingCredential { provider: VoiceProviderId },
    #[error("voice provider `{provider}` has no remote transport")]
    Unsupported { provider: VoiceProviderId },
    #[error("transport error calling voice provider `{provider}`: {message}")]
    Transport { provider: VoiceProviderId, message: String },
    #[error("voice provider `{provider}` answered with status {status}")]
    Upstream { provider: VoiceProviderId, status: u16 },
    #[error("could not decode `{provider}` response: {message}")]
    Decode { provider: VoiceProviderId, message: String },
    #[error("voice http client could not be built: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceHealthStatus {
    Healthy,
    Degraded,
    Offline,
}

impl VoiceHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        }
    }
}

/// Outcome of one voice health probe. A degraded provider is a value here,
/// never an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProviderHealth {
    pub provider: VoiceProviderId,
    pub status: VoiceHealthStatus,
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<VoiceProviderId>,
}

impl VoiceProviderHealth {
    pub fn healthy(provider: VoiceProviderId) -> Self {
        Self::new(provider, VoiceHealthStatus::Healthy, None)
    }

    pub fn degraded(provider: VoiceProviderId, reason: impl Into<String>) -> Self {
        Self::new(provider, VoiceHealthStatus::Degraded, Some(reason.into()))
    }

    pub fn offline(provider: VoiceProviderId, reason: impl Into<String>) -> Self {
        Self::new(provider, VoiceHealthStatus::Offline, Some(reason.into()))
    }

    fn new(provider: VoiceProviderId, status: VoiceHealthStatus, reason: Option<String>) -> Self {
        Self { provider, status, checked_at: Utc::now(), reason, fallback_provider: None }
    }

    pub fn with_fallback(mut self, fallback: VoiceProviderId) -> Self {
        self.fallback_provider = Some(fallback);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == VoiceHealthStatus::Healthy
    }
}

/// Secret and optional endpoint override for one remote voice provider.
#[derive(Clone, Debug)]
pub struct VoiceCredential {
    pub secret: SecretString,
    pub endpoint: Option<String>,
}

impl VoiceCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: SecretString::from(secret.into()), endpoint: None }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// The binding's endpoint already reflects profile overrides and the
/// provider's environment default.
impl From<&ResolvedBinding> for VoiceCredential {
    fn from(binding: &ResolvedBinding) -> Self {
        Self { secret: binding.secret.clone(), endpoint: Some(binding.endpoint.clone()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSession {
    pub session_id: String,
    pub provider: VoiceProviderId,
    pub opened_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptionRequest {
    pub audio: Vec<u8>,
    pub mime_type: String,
    pub language: Option<String>,
}

impl TranscriptionRequest {
    pub fn new(audio: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self { audio, mime_type: mime_type.into(), language: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), voice: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transcription {
    Text { text: String },
    /// The client must transcribe on-device.
    RequiresLocalProcessing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SynthesizedAudio {
    Audio { content_type: String, bytes: Vec<u8> },
    /// The client must synthesize on-device.
    RequiresLocalProcessing,
}

/// Contract shared by every voice backend.
#[async_trait]
pub trait VoiceAdapter: Send + Sync {
    fn provider_id(&self) -> VoiceProviderId;

    async fn probe_health(&self) -> VoiceProviderHealth;

    async fn open_session(&self, session_id: &str) -> Result<VoiceSession, VoiceError>;

    async fn close_session(&self, session: &VoiceSession) -> Result<(), VoiceError>;

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcription, VoiceError>;

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, VoiceError>;
}
