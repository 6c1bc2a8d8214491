use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use relay_core::config::{AutonomyLevel, ToolsConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalDecision {
    Allow,
    RequireApproval { reason_code: &'static str },
}

/// Answers "does this autonomy level and tool need human sign-off".
pub trait ApprovalPolicy: Send + Sync {
    fn evaluate(&self, autonomy: AutonomyLevel, tool_name: &str) -> ApprovalDecision;

    fn requires_approval(&self, autonomy: AutonomyLevel, tool_name: &str) -> bool {
        matches!(self.evaluate(autonomy, tool_name), ApprovalDecision::RequireApproval { .. })
    }
}

/// Autonomy level plus per-tool override lists. Exemptions win, then the
/// required list (at every level, autonomous included), then the level's
/// default.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticApprovalPolicy {
    required: BTreeSet<String>,
    exempt: BTreeSet<String>,
}

impl StaticApprovalPolicy {
    pub fn new<R, E>(required: R, exempt: E) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            exempt: exempt.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.approval_required.iter().cloned(), config.approval_exempt.iter().cloned())
    }
}

impl ApprovalPolicy for StaticApprovalPolicy {
    fn evaluate(&self, autonomy: AutonomyLevel, tool_name: &str) -> ApprovalDecision {
        if self.exempt.contains(tool_name) {
            return ApprovalDecision::Allow;
        }
        if self.required.contains(tool_name) {
            return ApprovalDecision::RequireApproval { reason_code: "tool_requires_approval" };
        }
        match autonomy {
            AutonomyLevel::Supervised => {
                ApprovalDecision::RequireApproval { reason_code: "supervised_autonomy" }
            }
            AutonomyLevel::Assisted | AutonomyLevel::Autonomous => ApprovalDecision::Allow,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub session_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub reason_code: String,
    pub requested_at: DateTime<Utc>,
}

pub trait ApprovalQueue: Send + Sync {
    fn enqueue(&self, request: ApprovalRequest);
}

#[derive(Clone, Default)]
pub struct InMemoryApprovalQueue {
    requests: Arc<Mutex<Vec<ApprovalRequest>>>,
}

impl InMemoryApprovalQueue {
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ApprovalQueue for InMemoryApprovalQueue {
    fn enqueue(&self, request: ApprovalRequest) {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }
    }
}
