//! Voice provider ids and the remote transport table.

use std::fmt;

use relay_core::provider::ProviderId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoiceProviderId {
    #[serde(rename = "browser")]
    Browser,
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
    #[serde(rename = "deepgram")]
    Deepgram,
    #[serde(rename = "openai")]
    OpenAi,
}

/// The adapter every resolution can fall back to.
pub const LOCAL_VOICE_PROVIDER: VoiceProviderId = VoiceProviderId::Browser;

impl VoiceProviderId {
    pub const ALL: [VoiceProviderId; 4] =
        [Self::Browser, Self::ElevenLabs, Self::Deepgram, Self::OpenAi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::ElevenLabs => "elevenlabs",
            Self::Deepgram => "deepgram",
            Self::OpenAi => "openai",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Browser => &["local", "web"],
            Self::ElevenLabs => &["eleven_labs", "11labs"],
            Self::Deepgram => &[],
            Self::OpenAi => &["openai_realtime"],
        }
    }

    /// Canonical id or alias, case-insensitive. Unrecognized input is the local adapter.
    pub fn normalize(value: &str) -> Self {
        Self::lookup(value).unwrap_or(LOCAL_VOICE_PROVIDER)
    }

    pub fn lookup(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == value || id.aliases().contains(&value.as_str()))
    }

    pub fn is_local(&self) -> bool {
        *self == LOCAL_VOICE_PROVIDER
    }

    pub fn remote_spec(&self) -> Option<&'static RemoteVoiceSpec> {
        REMOTE_VOICE_SPECS.iter().find(|spec| spec.provider == *self)
    }
}

impl fmt::Display for VoiceProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceAuth {
    /// `Authorization: Bearer <secret>`.
    Bearer,
    /// `Authorization: Token <secret>`.
    Token,
    /// Secret carried verbatim in a vendor header.
    Header(&'static str),
}

/// Where a remote voice provider's credential comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceCredentialSource {
    /// Voice-only vendor key read from this environment variable.
    Env(&'static str),
    /// Shares the chat provider's resolved binding (org profile, legacy key,
    /// or environment key, with cooldown and endpoint overrides applied).
    Binding(ProviderId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscribeUpload {
    /// multipart form with the audio under `file` and the model under the given field.
    Multipart { model_field: &'static str, model: &'static str },
    /// Raw audio bytes as the request body, typed by the caller's mime type.
    RawBody,
}

#[derive(Clone, Copy, Debug)]
pub struct RemoteVoiceSpec {
    pub provider: VoiceProviderId,
    pub default_endpoint: &'static str,
    pub credential: VoiceCredentialSource,
    pub auth: VoiceAuth,
    /// Read-only path used as the health probe.
    pub probe_path: &'static str,
    pub transcribe_path: &'static str,
    pub transcribe_upload: TranscribeUpload,
    /// JSON pointer to the transcript text in the transcription response.
    pub transcript_pointer: &'static str,
    /// `{voice}` is replaced by the requested or default voice.
    pub synthesize_path: &'static str,
    pub synthesize_text_field: &'static str,
    /// Body field and value naming the synthesis model, when the provider wants one.
    pub synthesize_model: Option<(&'static str, &'static str)>,
    /// Voice travels in the JSON body instead of the path.
    pub voice_in_body: bool,
    pub default_voice: &'static str,
}

impl RemoteVoiceSpec {
    pub fn auth_header(&self, secret: &str) -> (&'static str, String) {
        match self.auth {
            VoiceAuth::Bearer => ("authorization", format!("Bearer {secret}")),
            VoiceAuth::Token => ("authorization", format!("Token {secret}")),
            VoiceAuth::Header(name) => (name, secret.to_string()),
        }
    }

    pub fn synthesize_path_for(&self, voice: Option<&str>) -> String {
        self.synthesize_path.replace("{voice}", voice.unwrap_or(self.default_voice))
    }
}

pub static REMOTE_VOICE_SPECS: [RemoteVoiceSpec; 3] = [
    RemoteVoiceSpec {
        provider: VoiceProviderId::ElevenLabs,
        default_endpoint: "https://api.elevenlabs.io",
        credential: VoiceCredentialSource::Env("ELEVENLABS_API_KEY"),
        auth: VoiceAuth::Header("xi-api-key"),
        probe_path: "/v1/user",
        transcribe_path: "/v1/speech-to-text",
        transcribe_upload: TranscribeUpload::Multipart { model_field: "model_id", model: "scribe_v1" },
        transcript_pointer: "/text",
        synthesize_path: "/v1/text-to-speech/{voice}",
        synthesize_text_field: "text",
        synthesize_model: Some(("model_id", "eleven_multilingual_v2")),
        voice_in_body: false,
        default_voice: "21m00Tcm4TlvDq8ikWAM",
    },
    RemoteVoiceSpec {
        provider: VoiceProviderId::Deepgram,
        default_endpoint: "https://api.deepgram.com",
        credential: VoiceCredentialSource::Env("DEEPGRAM_API_KEY"),
        auth: VoiceAuth::Token,
        probe_path: "/v1/projects",
        transcribe_path: "/v1/listen",
        transcribe_upload: TranscribeUpload::RawBody,
        transcript_pointer: "/results/channels/0/alternatives/0/transcript",
        synthesize_path: "/v1/speak?model={voice}",
        synthesize_text_field: "text",
        synthesize_model: None,
        voice_in_body: false,
        default_voice: "aura-asteria-en",
    },
    RemoteVoiceSpec {
        provider: VoiceProviderId::OpenAi,
        default_endpoint: "https://api.openai.com/v1",
        credential: VoiceCredentialSource::Binding(ProviderId::OpenAi),
        auth: VoiceAuth::Bearer,
        probe_path: "/models",
        transcribe_path: "/audio/transcriptions",
        transcribe_upload: TranscribeUpload::Multipart { model_field: "model", model: "whisper-1" },
        transcript_pointer: "/text",
        synthesize_path: "/audio/speech",
        synthesize_text_field: "input",
        synthesize_model: Some(("model", "tts-1")),
        voice_in_body: true,
        default_voice: "alloy",
    },
];
