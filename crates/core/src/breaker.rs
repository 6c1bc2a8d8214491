//! Per-session tool circuit breaker state.
//!
//! The state is an explicit value: it is rehydrated from a persisted patch at
//! turn start, mutated by the executor while the turn runs, and turned back
//! into a patch for the session store afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Consecutive failures after which a tool is disabled for the session.
pub const FAILURE_THRESHOLD: u32 = 3;
/// Distinct disabled tools after which the session is reported degraded.
pub const DEGRADED_THRESHOLD: usize = 3;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailureState {
    #[serde(default)]
    pub failure_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub disabled: BTreeSet<String>,
}

/// Persistable outcome of a turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailurePatch {
    pub disabled_tools: Vec<String>,
    pub failure_counts: BTreeMap<String, u32>,
    pub degraded: bool,
    pub degraded_reason: Option<String>,
}

impl ToolFailureState {
    pub fn from_patch(patch: &ToolFailurePatch) -> Self {
        Self {
            failure_counts: patch.failure_counts.clone(),
            disabled: patch.disabled_tools.iter().cloned().collect(),
        }
    }

    pub fn failure_count(&self, tool: &str) -> u32 {
        self.failure_counts.get(tool).copied().unwrap_or(0)
    }

    pub fn is_disabled(&self, tool: &str) -> bool {
        self.disabled.contains(tool) || self.failure_count(tool) >= FAILURE_THRESHOLD
    }

    /// Returns `true` when this failure is the one that disabled the tool.
    pub fn record_failure(&mut self, tool: &str) -> bool {
        let count = self.failure_counts.entry(tool.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count >= FAILURE_THRESHOLD && self.disabled.insert(tool.to_string())
    }

    /// Success breaks the run of consecutive failures. Disablement is sticky.
    pub fn record_success(&mut self, tool: &str) {
        if !self.disabled.contains(tool) {
            self.failure_counts.remove(tool);
        }
    }

    pub fn patch(&self) -> ToolFailurePatch {
        let disabled_tools: Vec<String> = self.disabled.iter().cloned().collect();
        let degraded = disabled_tools.len() >= DEGRADED_THRESHOLD;
        let degraded_reason = degraded.then(|| {
            format!(
                "{} tools disabled after repeated failures: {}",
                disabled_tools.len(),
                disabled_tools.join(", ")
            )
        });

        ToolFailurePatch {
            disabled_tools,
            failure_counts: self.failure_counts.clone(),
            degraded,
            degraded_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ToolFailureState, FAILURE_THRESHOLD};

    #[test]
    fn third_consecutive_failure_disables_once() {
        let mut state = ToolFailureState::default();

        assert!(!state.record_failure("search"));
        assert!(!state.record_failure("search"));
        assert!(state.record_failure("search"));
        assert!(state.is_disabled("search"));
        assert!(!state.record_failure("search"), "disablement is reported only once");
        assert!(!state.is_disabled("lookup"));
    }

    #[test]
    fn success_resets_counter_until_disabled() {
        let mut state = ToolFailureState::default();
        state.record_failure("search");
        state.record_failure("search");
        state.record_success("search");
        assert_eq!(state.failure_count("search"), 0);

        for _ in 0..FAILURE_THRESHOLD {
            state.record_failure("search");
        }
        state.record_success("search");
        assert!(state.is_disabled("search"));
    }

    #[test]
    fn patch_marks_degraded_at_three_disabled_tools() {
        let mut state = ToolFailureState::default();
        for tool in ["a", "b"] {
            for _ in 0..FAILURE_THRESHOLD {
                state.record_failure(tool);
            }
        }
        assert!(!state.patch().degraded);

        for _ in 0..FAILURE_THRESHOLD {
            state.record_failure("c");
        }
        let patch = state.patch();
        assert!(patch.degraded);
        assert_eq!(patch.disabled_tools, vec!["a", "b", "c"]);
        assert!(patch.degraded_reason.as_deref().is_some_and(|reason| reason.contains("a, b, c")));
    }

    #[test]
    fn state_rehydrates_from_persisted_patch() {
        let mut state = ToolFailureState::default();
        state.record_failure("lookup");
        for _ in 0..FAILURE_THRESHOLD {
            state.record_failure("deploy");
        }

        let restored = ToolFailureState::from_patch(&state.patch());

        assert_eq!(restored, state);
        assert!(restored.is_disabled("deploy"));
        assert_eq!(restored.failure_count("lookup"), 1);
    }
}
