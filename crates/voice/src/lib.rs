//! Voice runtime adapters.
//!
//! Remote providers are reached through one table-driven HTTP adapter; the
//! browser adapter is the guaranteed-available fallback. Resolution never
//! hands back a remote adapter whose own probe failed.

pub mod adapter;
pub mod gateway;
pub mod local;
pub mod provider;
pub mod remote;
pub mod resolver;

pub use adapter::{
    SynthesisRequest, SynthesizedAudio, Transcription, TranscriptionRequest, VoiceAdapter,
    VoiceCredential, VoiceError, VoiceHealthStatus, VoiceProviderHealth, VoiceSession,
};
pub use gateway::VoiceGateway;
pub use local::BrowserVoiceAdapter;
pub use provider::{VoiceCredentialSource, VoiceProviderId, LOCAL_VOICE_PROVIDER};
pub use remote::HttpVoiceAdapter;
pub use resolver::{VoiceAdapterResolver, VoiceResolution};
