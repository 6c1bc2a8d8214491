use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relay_core::breaker::{ToolFailurePatch, ToolFailureState};
use relay_core::errors::ApplicationError;

/// Persists breaker state between turns, keyed by session id.
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    /// Unknown sessions start from a clean state.
    async fn load(&self, session_id: &str) -> Result<ToolFailureState, ApplicationError>;
    async fn save(&self, session_id: &str, patch: &ToolFailurePatch) -> Result<(), ApplicationError>;
}

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, ToolFailurePatch>>>,
}

impl InMemorySessionStore {
    pub fn snapshot(&self, session_id: &str) -> Option<ToolFailurePatch> {
        match self.sessions.lock() {
            Ok(sessions) => sessions.get(session_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(session_id).cloned(),
        }
    }
}

#[async_trait]
impl SessionStateStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<ToolFailureState, ApplicationError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| ApplicationError::SessionStore("session store lock poisoned".to_string()))?;
        Ok(sessions.get(session_id).map(ToolFailureState::from_patch).unwrap_or_default())
    }

    async fn save(&self, session_id: &str, patch: &ToolFailurePatch) -> Result<(), ApplicationError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| ApplicationError::SessionStore("session store lock poisoned".to_string()))?;
        sessions.insert(session_id.to_string(), patch.clone());
        Ok(())
    }
}
