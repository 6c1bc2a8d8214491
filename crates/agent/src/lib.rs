//! Agent runtime: tool execution for one session turn.
//!
//! - `tools` - registry of named, async tools
//! - `approvals` - autonomy-level approval policy and approval queue
//! - `breaker` - sequential executor guarded by the per-session circuit breaker
//! - `session` - persistence seam for breaker state between turns
//! - `runtime` - `AgentRuntime::run_tool_turn`, tying the above together
//! - `health` - HTTP credential probe for resolved bindings
//!
//! Tool failures never escape as errors from a turn. They become `error` or
//! `disabled` results and canonical tool messages. A failed state load is the
//! only `Err`; a failed save rides along in `ToolTurn::persist_error`.

pub mod approvals;
pub mod breaker;
pub mod health;
pub mod runtime;
pub mod session;
pub mod tools;

pub use approvals::{ApprovalPolicy, StaticApprovalPolicy};
pub use breaker::{ToolCallResult, ToolCallStatus};
pub use health::HttpCredentialProbe;
pub use runtime::{AgentRuntime, ToolTurn};
pub use session::{InMemorySessionStore, SessionStateStore};
pub use tools::{Tool, ToolRegistry};
