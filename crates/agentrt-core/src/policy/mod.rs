//! Approval policy engine and gateway middleware.
//!
//! A policy is a user-authored program that decides `ALLOW`/`ASK`/
//! `DENY_ABORT`/`DENY_CONTINUE` for every tool call. The gateway
//! (`gateway::PolicyGateway`) interposes on every call before it reaches
//! the compositor; the engine (`engine::PolicyEngine`) runs the user's
//! program in a sandboxed subprocess (`crate::process::run_sandboxed`).

pub mod admin;
pub mod engine;
pub mod gateway;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use admin::PolicyAdminTool;
pub use engine::PolicyEngine;
pub use gateway::{ApprovalDecision, PendingCallInfo, PolicyGateway};

/// `{name, arguments_json}` sent to the policy program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub name: String,
    pub arguments_json: Value,
}

/// `decide()`'s outcome, wire-named per the spec's `ALLOW`/`ASK`/
/// `DENY_ABORT`/`DENY_CONTINUE` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyDecision {
    Allow,
    Ask,
    DenyAbort,
    DenyContinue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub decision: PolicyDecision,
    #[serde(default)]
    pub rationale: String,
}
