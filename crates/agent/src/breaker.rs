//! Sequential tool execution guarded by the per-session circuit breaker.
//!
//! Calls run strictly in request order: a failure that disables a tool makes
//! every later call to it in the same batch come back `disabled`.

use std::sync::Arc;

use chrono::Utc;
use relay_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use relay_core::breaker::{ToolFailurePatch, ToolFailureState};
use relay_core::config::AutonomyLevel;
use relay_core::errors::DomainError;
use relay_core::normalize::NormalizedToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::approvals::{ApprovalDecision, ApprovalPolicy, ApprovalQueue, ApprovalRequest};
use crate::tools::ToolRegistry;

/// Shown instead of the underlying failure once a tool is disabled.
pub const DISABLED_TOOL_MESSAGE: &str =
    "This tool is temporarily unavailable for the rest of this session.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Success,
    Error,
    Disabled,
    PendingApproval,
    /// Not attempted: the turn ran out of tool rounds.
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub status: ToolCallStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl ToolCallResult {
    fn new(call: &NormalizedToolCall, status: ToolCallStatus) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status,
            output: None,
            error: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TurnContext {
    pub session_id: String,
    pub autonomy: AutonomyLevel,
    pub audit: AuditContext,
}

impl TurnContext {
    pub fn new(session_id: impl Into<String>, autonomy: AutonomyLevel) -> Self {
        let session_id = session_id.into();
        let audit = AuditContext::for_session(session_id.clone(), "agent-runtime");
        Self { session_id, autonomy, audit }
    }
}

/// Side effects the breaker obligates its caller to perform.
pub trait BreakerObserver: Send + Sync {
    fn approval_requested(&self, context: &TurnContext, request: ApprovalRequest);
    fn tool_disabled(&self, context: &TurnContext, tool_name: &str, failure_count: u32);
}

/// Enqueues approval requests and records both side effects as audit events.
pub struct AuditingObserver {
    sink: Arc<dyn AuditSink>,
    queue: Arc<dyn ApprovalQueue>,
}

impl AuditingObserver {
    pub fn new(sink: Arc<dyn AuditSink>, queue: Arc<dyn ApprovalQueue>) -> Self {
        Self { sink, queue }
    }
}

impl BreakerObserver for AuditingObserver {
    fn approval_requested(&self, context: &TurnContext, request: ApprovalRequest) {
        self.sink.emit(
            context
                .audit
                .event("approval.requested", AuditCategory::Approval, AuditOutcome::Success)
                .with_metadata("tool_name", request.tool_name.clone())
                .with_metadata("tool_call_id", request.tool_call_id.clone())
                .with_metadata("reason_code", request.reason_code.clone())
                .with_metadata("autonomy_level", context.autonomy.as_str()),
        );
        self.queue.enqueue(request);
    }

    fn tool_disabled(&self, context: &TurnContext, tool_name: &str, failure_count: u32) {
        self.sink.emit(
            context
                .audit
                .event("tool.disabled", AuditCategory::Tool, AuditOutcome::Failed)
                .with_metadata("tool_name", tool_name)
                .with_metadata("failure_count", failure_count.to_string()),
        );
    }
}

#[derive(Clone, Debug)]
pub struct BreakerOutcome {
    pub results: Vec<ToolCallResult>,
    pub state: ToolFailureState,
    pub patch: ToolFailurePatch,
}

pub struct ToolBreaker<'a> {
    registry: &'a ToolRegistry,
    policy: &'a dyn ApprovalPolicy,
    observer: &'a dyn BreakerObserver,
}

impl<'a> ToolBreaker<'a> {
    pub fn new(
        registry: &'a ToolRegistry,
        policy: &'a dyn ApprovalPolicy,
        observer: &'a dyn BreakerObserver,
    ) -> Self {
        Self { registry, policy, observer }
    }

    pub async fn execute(
        &self,
        context: &TurnContext,
        mut state: ToolFailureState,
        calls: &[NormalizedToolCall],
    ) -> BreakerOutcome {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.execute_one(context, &mut state, call).await;
            results.push(result);
        }

        let patch = state.patch();
        if patch.degraded {
            warn!(
                event_name = "tool.breaker.session_degraded",
                session_id = %context.session_id,
                correlation_id = %context.audit.correlation_id,
                disabled_tools = patch.disabled_tools.len(),
                "session degraded by disabled tools"
            );
        }

        BreakerOutcome { results, state, patch }
    }

    async fn execute_one(
        &self,
        context: &TurnContext,
        state: &mut ToolFailureState,
        call: &NormalizedToolCall,
    ) -> ToolCallResult {
        if state.is_disabled(&call.name) {
            debug!(
                event_name = "tool.breaker.skipped_disabled",
                session_id = %context.session_id,
                tool_name = %call.name,
                "tool call skipped"
            );
            let mut result = ToolCallResult::new(call, ToolCallStatus::Disabled);
            result.error = Some(DISABLED_TOOL_MESSAGE.to_string());
            return result;
        }

        let arguments = match parse_arguments(call) {
            Ok(arguments) => arguments,
            Err(error) => {
                self.record_failure(context, state, &call.name);
                let mut result = ToolCallResult::new(call, ToolCallStatus::Error);
                result.error = Some(error.to_string());
                return result;
            }
        };

        if let ApprovalDecision::RequireApproval { reason_code } =
            self.policy.evaluate(context.autonomy, &call.name)
        {
            self.observer.approval_requested(
                context,
                ApprovalRequest {
                    session_id: context.session_id.clone(),
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    arguments,
                    reason_code: reason_code.to_string(),
                    requested_at: Utc::now(),
                },
            );
            return ToolCallResult::new(call, ToolCallStatus::PendingApproval);
        }

        match self.registry.invoke(&call.name, arguments).await {
            Ok(output) => {
                state.record_success(&call.name);
                let mut result = ToolCallResult::new(call, ToolCallStatus::Success);
                result.output = Some(output);
                result
            }
            Err(error) => {
                self.record_failure(context, state, &call.name);
                let mut result = ToolCallResult::new(call, ToolCallStatus::Error);
                result.error = Some(error.to_string());
                result
            }
        }
    }

    fn record_failure(&self, context: &TurnContext, state: &mut ToolFailureState, tool_name: &str) {
        if state.record_failure(tool_name) {
            let failure_count = state.failure_count(tool_name);
            warn!(
                event_name = "tool.breaker.disabled",
                session_id = %context.session_id,
                correlation_id = %context.audit.correlation_id,
                tool_name,
                failure_count,
                "tool disabled for session"
            );
            self.observer.tool_disabled(context, tool_name, failure_count);
        }
    }
}

fn parse_arguments(call: &NormalizedToolCall) -> Result<Value, DomainError> {
    let reason = match serde_json::from_str::<Value>(&call.arguments) {
        Ok(value @ Value::Object(_)) => return Ok(value),
        Ok(_) => "expected a JSON object".to_string(),
        Err(error) => error.to_string(),
    };
    Err(DomainError::MalformedToolArguments { tool: call.name.clone(), reason })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use relay_core::breaker::ToolFailureState;
    use relay_core::config::AutonomyLevel;
    use relay_core::normalize::NormalizedToolCall;
    use serde_json::{json, Value};

    use super::{BreakerObserver, ToolBreaker, ToolCallStatus, TurnContext, DISABLED_TOOL_MESSAGE};
    use crate::approvals::{ApprovalRequest, StaticApprovalPolicy};
    use crate::tools::{Tool, ToolRegistry};

    struct Flaky {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn execute(&self, _input: Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("upstream 500: internal stack trace"))
        }
    }

    struct Adder;

    #[async_trait]
    impl Tool for Adder {
        fn name(&self) -> &str {
            "add"
        }

        async fn execute(&self, input: Value) -> Result<Value> {
            let a = input["a"].as_i64().unwrap_or(0);
            let b = input["b"].as_i64().unwrap_or(0);
            Ok(json!({ "sum": a + b }))
        }
    }

    #[derive(Default)]
    struct Recorder {
        approvals: Mutex<Vec<ApprovalRequest>>,
        disabled: Mutex<Vec<String>>,
    }

    impl BreakerObserver for Recorder {
        fn approval_requested(&self, _context: &TurnContext, request: ApprovalRequest) {
            self.approvals.lock().expect("lock").push(request);
        }

        fn tool_disabled(&self, _context: &TurnContext, tool_name: &str, _failure_count: u32) {
            self.disabled.lock().expect("lock").push(tool_name.to_string());
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> NormalizedToolCall {
        NormalizedToolCall { id: id.to_string(), name: name.to_string(), arguments: arguments.to_string() }
    }

    fn registry(flaky_calls: Arc<AtomicUsize>) -> ToolRegistry {
        let mut registry = ToolRegistry::default();
        registry.register(Flaky { calls: flaky_calls });
        registry.register(Adder);
        registry
    }

    fn open_policy() -> StaticApprovalPolicy {
        StaticApprovalPolicy::default()
    }

    #[tokio::test]
    async fn third_failure_disables_and_fourth_call_skips_registry() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let registry = registry(invocations.clone());
        let policy = open_policy();
        let observer = Recorder::default();
        let breaker = ToolBreaker::new(&registry, &policy, &observer);
        let context = TurnContext::new("sess-1", AutonomyLevel::Autonomous);
        let calls: Vec<_> = (0..4).map(|index| call(&format!("c{index}"), "flaky", "{}")).collect();

        let outcome = breaker.execute(&context, ToolFailureState::default(), &calls).await;

        let statuses: Vec<_> = outcome.results.iter().map(|result| result.status).collect();
        assert_eq!(
            statuses,
            vec![
                ToolCallStatus::Error,
                ToolCallStatus::Error,
                ToolCallStatus::Error,
                ToolCallStatus::Disabled
            ]
        );
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.results[3].error.as_deref(), Some(DISABLED_TOOL_MESSAGE));
        assert!(outcome.state.is_disabled("flaky"));
        assert_eq!(outcome.patch.disabled_tools, vec!["flaky"]);
        assert_eq!(*observer.disabled.lock().expect("lock"), vec!["flaky".to_string()]);
    }

    #[tokio::test]
    async fn malformed_arguments_count_once_against_only_that_tool() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let policy = open_policy();
        let observer = Recorder::default();
        let breaker = ToolBreaker::new(&registry, &policy, &observer);
        let context = TurnContext::new("sess-2", AutonomyLevel::Autonomous);

        let outcome = breaker
            .execute(
                &context,
                ToolFailureState::default(),
                &[call("c1", "add", "not json"), call("c2", "flaky", "[1, 2]")],
            )
            .await;

        assert_eq!(outcome.results[0].status, ToolCallStatus::Error);
        assert_eq!(outcome.state.failure_count("add"), 1);
        assert_eq!(outcome.state.failure_count("flaky"), 1, "arrays are not argument objects");
        assert_eq!(outcome.state.failure_counts.len(), 2);
        assert_eq!(
            outcome.results[1].error.as_deref(),
            Some("tool `flaky` received malformed arguments: expected a JSON object")
        );
    }

    #[tokio::test]
    async fn approval_gate_enqueues_without_invoking_or_counting() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let registry = registry(invocations.clone());
        let policy = StaticApprovalPolicy::new(["flaky"], Vec::<String>::new());
        let observer = Recorder::default();
        let breaker = ToolBreaker::new(&registry, &policy, &observer);
        let context = TurnContext::new("sess-3", AutonomyLevel::Assisted);

        let outcome = breaker
            .execute(
                &context,
                ToolFailureState::default(),
                &[call("c1", "flaky", r#"{"q": 1}"#), call("c2", "add", r#"{"a": 2, "b": 3}"#)],
            )
            .await;

        assert_eq!(outcome.results[0].status, ToolCallStatus::PendingApproval);
        assert_eq!(outcome.results[1].status, ToolCallStatus::Success);
        assert_eq!(outcome.results[1].output, Some(json!({"sum": 5})));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.state.failure_count("flaky"), 0);
        let approvals = observer.approvals.lock().expect("lock");
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].arguments, json!({"q": 1}));
    }

    #[tokio::test]
    async fn disabled_tools_skip_approval_and_parsing() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let policy = StaticApprovalPolicy::default();
        let observer = Recorder::default();
        let breaker = ToolBreaker::new(&registry, &policy, &observer);
        let context = TurnContext::new("sess-4", AutonomyLevel::Supervised);
        let mut state = ToolFailureState::default();
        state.disabled.insert("add".to_string());

        let outcome = breaker.execute(&context, state, &[call("c1", "add", "garbage")]).await;

        assert_eq!(outcome.results[0].status, ToolCallStatus::Disabled);
        assert!(observer.approvals.lock().expect("lock").is_empty());
        assert_eq!(outcome.state.failure_count("add"), 0);
    }
}
