use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::CredentialProfile;

pub const BASE_COOLDOWN_SECS: i64 = 30;
pub const MAX_COOLDOWN_SECS: i64 = 3_600;

/// Result of a credential validation probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Healthy,
    Failed { reason: String },
}

/// Applies a probe result to a profile's health metadata.
///
/// Writes are last-write-wins per profile; callers persist the returned value.
pub fn record_probe_outcome(
    profile: &CredentialProfile,
    outcome: &ProbeOutcome,
    now: DateTime<Utc>,
) -> CredentialProfile {
    let mut updated = profile.clone();
    match outcome {
        ProbeOutcome::Healthy => {
            updated.failure_count = 0;
            updated.cooldown_until = None;
            updated.last_failure_reason = None;
        }
        ProbeOutcome::Failed { reason } => {
            updated.failure_count = profile.failure_count.saturating_add(1);
            updated.cooldown_until = Some(now + cooldown_for(updated.failure_count));
            updated.last_failure_reason = Some(reason.clone());
        }
    }
    updated
}

fn cooldown_for(failure_count: u32) -> Duration {
    let exponent = failure_count.saturating_sub(1).min(16);
    let seconds = BASE_COOLDOWN_SECS.saturating_mul(1_i64 << exponent).min(MAX_COOLDOWN_SECS);
    Duration::seconds(seconds)
}
