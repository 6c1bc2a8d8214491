use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::adapter::{
    SynthesisRequest, SynthesizedAudio, Transcription, TranscriptionRequest, VoiceAdapter,
    VoiceCredential, VoiceError, VoiceProviderHealth, VoiceSession,
};
use crate::provider::{RemoteVoiceSpec, TranscribeUpload, VoiceProviderId};

const DEFAULT_AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Remote voice backend. One implementation serves every provider in
/// [`crate::provider::REMOTE_VOICE_SPECS`].
#[derive(Clone, Debug)]
pub struct HttpVoiceAdapter {
    spec: &'static RemoteVoiceSpec,
    credential: VoiceCredential,
    client: reqwest::Client,
}

impl HttpVoiceAdapter {
    /// Fails immediately when no usable credential is supplied.
    pub fn new(
        provider: VoiceProviderId,
        credential: Option<&VoiceCredential>,
        client: reqwest::Client,
    ) -> Result<Self, VoiceError> {
        let spec = provider.remote_spec().ok_or(VoiceError::Unsupported { provider })?;
        let credential = credential
            .filter(|credential| !credential.secret.expose_secret().trim().is_empty())
            .cloned()
            .ok_or(VoiceError::MissingCredential { provider })?;
        Ok(Self { spec, credential, client })
    }

    fn url(&self, path: &str) -> String {
        let endpoint = self.credential.endpoint.as_deref().unwrap_or(self.spec.default_endpoint);
        format!("{}{}", endpoint.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let (name, value) = self.spec.auth_header(self.credential.secret.expose_secret());
        self.client.request(method, self.url(path)).header(name, value)
    }

    fn transport_error(&self, error: &reqwest::Error) -> VoiceError {
        let mut message = error.to_string();
        if let Some(url) = error.url() {
            message = message.replace(url.as_str(), "<endpoint>");
        }
        VoiceError::Transport { provider: self.spec.provider, message }
    }

    fn check_status(&self, status: StatusCode) -> Result<(), VoiceError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(VoiceError::Upstream { provider: self.spec.provider, status: status.as_u16() })
        }
    }

    fn transcribe_request(&self, request: &TranscriptionRequest) -> Result<RequestBuilder, VoiceError> {
        let mut builder = self.request(Method::POST, self.spec.transcribe_path);
        match self.spec.transcribe_upload {
            TranscribeUpload::Multipart { model_field, model } => {
                let part = Part::bytes(request.audio.clone())
                    .file_name("audio")
                    .mime_str(&request.mime_type)
                    .map_err(|error| VoiceError::Decode {
                        provider: self.spec.provider,
                        message: format!("invalid audio mime type: {error}"),
                    })?;
                let mut form = Form::new().part("file", part).text(model_field, model);
                if let Some(language) = &request.language {
                    form = form.text("language", language.clone());
                }
                builder = builder.multipart(form);
            }
            TranscribeUpload::RawBody => {
                if let Some(language) = &request.language {
                    builder = builder.query(&[("language", language.as_str())]);
                }
                builder = builder
                    .header("content-type", request.mime_type.as_str())
                    .body(request.audio.clone());
            }
        }
        Ok(builder)
    }

    fn synthesis_body(&self, request: &SynthesisRequest) -> Value {
        let mut body = Map::new();
        body.insert(self.spec.synthesize_text_field.to_string(), Value::String(request.text.clone()));
        if let Some((field, model)) = self.spec.synthesize_model {
            body.insert(field.to_string(), Value::String(model.to_string()));
        }
        if self.spec.voice_in_body {
            let voice = request.voice.as_deref().unwrap_or(self.spec.default_voice);
            body.insert("voice".to_string(), Value::String(voice.to_string()));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl VoiceAdapter for HttpVoiceAdapter {
    fn provider_id(&self) -> VoiceProviderId {
        self.spec.provider
    }

    async fn probe_health(&self) -> VoiceProviderHealth {
        let provider = self.spec.provider;
        let health = match self.request(Method::GET, self.spec.probe_path).send().await {
            Ok(response) => match response.status() {
                status if status.is_success() => VoiceProviderHealth::healthy(provider),
                status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                    VoiceProviderHealth::degraded(provider, format!("auth_rejected ({})", status.as_u16()))
                }
                StatusCode::TOO_MANY_REQUESTS => VoiceProviderHealth::degraded(provider, "rate_limited (429)"),
                status => VoiceProviderHealth::offline(provider, format!("unavailable ({})", status.as_u16())),
            },
            Err(error) if error.is_timeout() => VoiceProviderHealth::offline(provider, "probe_timeout"),
            Err(_) => VoiceProviderHealth::offline(provider, "unreachable"),
        };

        if health.is_healthy() {
            debug!(event_name = "voice.probe.healthy", provider = %provider, "voice probe succeeded");
        } else {
            warn!(
                event_name = "voice.probe.unhealthy",
                provider = %provider,
                status = health.status.as_str(),
                reason = health.reason.as_deref().unwrap_or(""),
                "voice probe failed"
            );
        }
        health
    }

    async fn open_session(&self, session_id: &str) -> Result<VoiceSession, VoiceError> {
        Ok(VoiceSession {
            session_id: session_id.to_string(),
            provider: self.spec.provider,
            opened_at: Utc::now(),
        })
    }

    async fn close_session(&self, _session: &VoiceSession) -> Result<(), VoiceError> {
        Ok(())
    }

    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcription, VoiceError> {
        let response = self
            .transcribe_request(request)?
            .send()
            .await
            .map_err(|error| self.transport_error(&error))?;
        self.check_status(response.status())?;

        let body: Value = response.json().await.map_err(|error| VoiceError::Decode {
            provider: self.spec.provider,
            message: error.to_string(),
        })?;
        let text = body
            .pointer(self.spec.transcript_pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| VoiceError::Decode {
                provider: self.spec.provider,
                message: format!("missing transcript at `{}`", self.spec.transcript_pointer),
            })?;
        Ok(Transcription::Text { text: text.to_string() })
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio, VoiceError> {
        let path = self.spec.synthesize_path_for(request.voice.as_deref());
        let response = self
            .request(Method::POST, &path)
            .json(&self.synthesis_body(request))
            .send()
            .await
            .map_err(|error| self.transport_error(&error))?;
        self.check_status(response.status())?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_AUDIO_CONTENT_TYPE)
            .to_string();
        let bytes = response.bytes().await.map_err(|error| self.transport_error(&error))?;
        Ok(SynthesizedAudio::Audio { content_type, bytes: bytes.to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::HttpVoiceAdapter;
    use crate::adapter::{SynthesisRequest, VoiceCredential, VoiceError};
    use crate::provider::VoiceProviderId;
    use serde_json::json;

    #[test]
    fn construction_requires_a_non_blank_credential() {
        let client = reqwest::Client::new();

        let missing = HttpVoiceAdapter::new(VoiceProviderId::Deepgram, None, client.clone());
        assert!(matches!(missing, Err(VoiceError::MissingCredential { provider: VoiceProviderId::Deepgram })));

        let blank = VoiceCredential::new("  ");
        let blank = HttpVoiceAdapter::new(VoiceProviderId::Deepgram, Some(&blank), client.clone());
        assert!(matches!(blank, Err(VoiceError::MissingCredential { .. })));

        let local = HttpVoiceAdapter::new(VoiceProviderId::Browser, Some(&VoiceCredential::new("k")), client);
        assert!(matches!(local, Err(VoiceError::Unsupported { .. })));
    }

    #[test]
    fn synthesis_bodies_follow_the_provider_table() {
        let client = reqwest::Client::new();
        let credential = VoiceCredential::new("k");
        let request = SynthesisRequest::new("hello");

        let openai = HttpVoiceAdapter::new(VoiceProviderId::OpenAi, Some(&credential), client.clone())
            .expect("adapter");
        assert_eq!(
            openai.synthesis_body(&request),
            json!({"input": "hello", "model": "tts-1", "voice": "alloy"})
        );

        let deepgram =
            HttpVoiceAdapter::new(VoiceProviderId::Deepgram, Some(&credential), client).expect("adapter");
        assert_eq!(deepgram.synthesis_body(&request), json!({"text": "hello"}));
    }
}
