pub mod audit;
pub mod bindings;
pub mod breaker;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod normalize;
pub mod provider;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use bindings::{
    record_probe_outcome, resolve_bindings, resolve_first_binding, strip_secret, BindingRequest,
    BindingSource, CredentialProfile, EnvironmentKeys, FallbackMetadata, FallbackReason,
    ProbeOutcome, PublicBinding, ResolvedBinding,
};
pub use breaker::{ToolFailurePatch, ToolFailureState};
pub use catalog::{CatalogError, ProviderCatalog, ProviderDescriptor};
pub use config::{AppConfig, AutonomyLevel, LoadOptions};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use normalize::{
    detect_provider, normalize_completion, normalize_error, normalize_model_for_provider,
    ChatMessage, ErrorClass, NormalizedCompletion, NormalizedError, NormalizedToolCall,
};
pub use provider::{ProviderCapabilities, ProviderId, WireProtocol, DEFAULT_PROVIDER};
