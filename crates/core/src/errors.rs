//! Layered error taxonomy.
//!
//! Domain errors are programmer or data faults inside the core. Application
//! errors add the collaborators (session store, upstream providers,
//! configuration). Interface errors are what a caller-facing edge shows,
//! always with a correlation id and a message that never carries provider
//! text or secrets.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::normalize::NormalizedError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("tool `{tool}` received malformed arguments: {reason}")]
    MalformedToolArguments { tool: String, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("no credential binding available for provider `{provider}`")]
    NoCredentialBinding { provider: String },
    #[error("provider `{}` failed with {}: {}", .0.provider, .0.class.as_str(), .0.message)]
    Provider(NormalizedError),
    #[error("session state store failed: {0}")]
    SessionStore(String),
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

const UNASSIGNED: &str = "unassigned";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("rejected: {message}")]
    Rejected { message: String, correlation_id: String },
    #[error("temporarily unavailable: {message}")]
    Unavailable { message: String, correlation_id: String },
    #[error("internal failure: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "The request was rejected. Check inputs and try again.",
            Self::Unavailable { .. } => "The assistant is temporarily unavailable. Please retry shortly.",
            Self::Internal { .. } => "Something went wrong on our side.",
        }
    }

    /// Stable class name for machine-readable envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Unavailable { .. } => "unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Rejected { correlation_id, .. }
            | Self::Unavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    fn with_correlation_id(mut self, value: String) -> Self {
        match &mut self {
            Self::Rejected { correlation_id, .. }
            | Self::Unavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => *correlation_id = value,
        }
        self
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError::from(self).with_correlation_id(correlation_id.into())
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(error: ApplicationError) -> Self {
        let correlation_id = UNASSIGNED.to_string();
        match error {
            ApplicationError::Domain(DomainError::MalformedToolArguments { .. }) => {
                Self::Rejected { message: "tool input failed validation".to_string(), correlation_id }
            }
            // Provider text stays internal; only the class crosses this boundary.
            ApplicationError::Provider(normalized) if normalized.retryable => {
                Self::Unavailable { message: normalized.class.as_str().to_string(), correlation_id }
            }
            ApplicationError::Provider(normalized) => {
                Self::Rejected { message: normalized.class.as_str().to_string(), correlation_id }
            }
            ApplicationError::SessionStore(message) => Self::Unavailable { message, correlation_id },
            error @ (ApplicationError::Domain(DomainError::Catalog(_))
            | ApplicationError::NoCredentialBinding { .. }
            | ApplicationError::Configuration(_)) => {
                Self::Internal { message: error.to_string(), correlation_id }
            }
        }
    }
}
