use std::sync::Arc;

use relay_core::breaker::ToolFailurePatch;
use relay_core::config::AutonomyLevel;
use relay_core::errors::ApplicationError;
use relay_core::normalize::{
    format_tool_error_message, format_tool_result_message, ChatMessage, NormalizedToolCall,
};
use relay_core::provider::{capabilities, ProviderId, DEFAULT_PROVIDER};
use serde_json::json;
use tracing::{info, warn};

use crate::approvals::ApprovalPolicy;
use crate::breaker::{
    BreakerObserver, ToolBreaker, ToolCallResult, ToolCallStatus, TurnContext,
    DISABLED_TOOL_MESSAGE,
};
use crate::session::SessionStateStore;
use crate::tools::ToolRegistry;

/// Returned for every call of a round past the provider's round budget.
pub const ROUND_LIMIT_MESSAGE: &str =
    "Tool round limit reached for this turn. Answer with the information already gathered.";

/// Result of one tool round: per-call results, the canonical messages to
/// append to the conversation, and the patch that was persisted.
///
/// Tools with side effects have already run when this is returned, so a
/// failed save is reported in `persist_error` instead of discarding results.
#[derive(Clone, Debug)]
pub struct ToolTurn {
    pub results: Vec<ToolCallResult>,
    pub messages: Vec<ChatMessage>,
    pub patch: ToolFailurePatch,
    pub persist_error: Option<ApplicationError>,
}

impl ToolTurn {
    pub fn is_persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

pub struct AgentRuntime {
    registry: ToolRegistry,
    policy: Arc<dyn ApprovalPolicy>,
    store: Arc<dyn SessionStateStore>,
    observer: Arc<dyn BreakerObserver>,
    autonomy: AutonomyLevel,
    provider: ProviderId,
}

impl AgentRuntime {
    pub fn new(
        registry: ToolRegistry,
        policy: Arc<dyn ApprovalPolicy>,
        store: Arc<dyn SessionStateStore>,
        observer: Arc<dyn BreakerObserver>,
        autonomy: AutonomyLevel,
    ) -> Self {
        Self { registry, policy, store, observer, autonomy, provider: DEFAULT_PROVIDER }
    }

    /// Provider whose capability record bounds the number of tool rounds.
    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = provider;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Rehydrates the session's breaker state, runs the batch in order, and
    /// persists the resulting patch.
    ///
    /// `round` is the 1-based index of this tool round within the current
    /// user turn. Only a failed load returns `Err`, since nothing has run yet.
    pub async fn run_tool_turn(
        &self,
        session_id: &str,
        round: u8,
        calls: &[NormalizedToolCall],
    ) -> Result<ToolTurn, ApplicationError> {
        let context = TurnContext::new(session_id, self.autonomy);
        let state = self.store.load(session_id).await?;

        let max_rounds = capabilities(self.provider).max_tool_rounds;
        if round > max_rounds {
            warn!(
                event_name = "tool.turn.round_limit",
                session_id,
                correlation_id = %context.audit.correlation_id,
                provider = %self.provider,
                round,
                max_rounds,
                "tool round budget exhausted"
            );
            let results: Vec<ToolCallResult> = calls.iter().map(round_limited).collect();
            let messages = results.iter().map(result_message).collect();
            return Ok(ToolTurn { results, messages, patch: state.patch(), persist_error: None });
        }

        let breaker = ToolBreaker::new(&self.registry, self.policy.as_ref(), self.observer.as_ref());
        let outcome = breaker.execute(&context, state, calls).await;

        let persist_error = match self.store.save(session_id, &outcome.patch).await {
            Ok(()) => None,
            Err(error) => {
                warn!(
                    event_name = "tool.turn.persist_failed",
                    session_id,
                    correlation_id = %context.audit.correlation_id,
                    error = %error,
                    "breaker state was not persisted; results are still returned"
                );
                Some(error)
            }
        };

        info!(
            event_name = "tool.turn.completed",
            session_id,
            correlation_id = %context.audit.correlation_id,
            round,
            call_count = calls.len(),
            disabled_tools = outcome.patch.disabled_tools.len(),
            degraded = outcome.patch.degraded,
            persisted = persist_error.is_none(),
            "tool turn completed"
        );

        let messages = outcome.results.iter().map(result_message).collect();
        Ok(ToolTurn { results: outcome.results, messages, patch: outcome.patch, persist_error })
    }
}

fn round_limited(call: &NormalizedToolCall) -> ToolCallResult {
    ToolCallResult {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        status: ToolCallStatus::Skipped,
        output: None,
        error: Some(ROUND_LIMIT_MESSAGE.to_string()),
    }
}

fn result_message(result: &ToolCallResult) -> ChatMessage {
    let id = result.tool_call_id.as_str();
    let name = result.tool_name.as_str();
    match result.status {
        ToolCallStatus::Success => {
            format_tool_result_message(id, name, result.output.as_ref().unwrap_or(&json!(null)))
        }
        ToolCallStatus::PendingApproval => {
            format_tool_result_message(id, name, &json!({ "status": "pending_approval" }))
        }
        ToolCallStatus::Disabled => format_tool_error_message(id, name, DISABLED_TOOL_MESSAGE),
        ToolCallStatus::Skipped => format_tool_error_message(id, name, ROUND_LIMIT_MESSAGE),
        ToolCallStatus::Error => format_tool_error_message(
            id,
            name,
            result.error.as_deref().unwrap_or("tool execution failed"),
        ),
    }
}
