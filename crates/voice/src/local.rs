use async_trait::async_trait;
use chrono::Utc;

use crate::adapter::{
    SynthesisRequest, SynthesizedAudio, Transcription, TranscriptionRequest, VoiceAdapter,
    VoiceError, VoiceProviderHealth, VoiceSession,
};
use crate::provider::{VoiceProviderId, LOCAL_VOICE_PROVIDER};

/// On-device speech handled by the client. Needs no credential and is always healthy.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserVoiceAdapter;

#[async_trait]
impl VoiceAdapter for BrowserVoiceAdapter {
    fn provider_id(&self) -> VoiceProviderId {
        LOCAL_VOICE_PROVIDER
    }

    async fn probe_health(&self) -> VoiceProviderHealth {
        VoiceProviderHealth::healthy(LOCAL_VOICE_PROVIDER)
    }

    async fn open_session(&self, session_id: &str) -> Result<VoiceSession, VoiceError> {
        Ok(VoiceSession {
            session_id: session_id.to_string(),
            provider: LOCAL_VOICE_PROVIDER,
            opened_at: Utc::now(),
        })
    }

    async fn close_session(&self, _session: &VoiceSession) -> Result<(), VoiceError> {
        Ok(())
    }

    async fn transcribe(&self, _request: &TranscriptionRequest) -> Result<Transcription, VoiceError> {
        Ok(Transcription::RequiresLocalProcessing)
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<SynthesizedAudio, VoiceError> {
        Ok(SynthesizedAudio::RequiresLocalProcessing)
    }
}
