//! Policy gateway middleware: interposes on every tool call before it
//! reaches the compositor.
//!
//! Grounded on the teacher's hook-decorator pattern in
//! `tools::registry::ToolRegistry::execute` (`pre_hooks` run before
//! dispatch, `post_hooks` after); this gateway is that same before/after
//! shape, specialized to always run and to suspend on `ASK` rather than
//! just block/continue.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::ReservedPolicyCode;
use crate::tool::{ToolCallResult, ToolProvider};

use super::{PolicyDecision, PolicyEngine, PolicyRequest};

/// An outstanding `ASK` awaiting an out-of-band decision.
pub struct PendingCallInfo {
    pub call_id: String,
    pub name: String,
    pub arguments_json: Value,
    pub rationale: String,
}

/// The outcome an admin `decide_call` resolves a pending `ASK` with,
/// mirroring the spec's "approve/deny/deny-continue" decision tool
/// vocabulary rather than a plain bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    DenyAbort,
    DenyContinue,
}

enum Resolution {
    Approve,
    DenyAbort,
    DenyContinue,
}

struct PendingEntry {
    info: PendingCallInfo,
    resolve: tokio::sync::oneshot::Sender<Resolution>,
}

/// Wraps a `ToolProvider` (normally the compositor) with policy
/// interposition. Not itself a `ToolProvider`: `call` takes the `call_id`
/// the agent loop already tracks in `pending_function_calls`, since the
/// pending-ask registry is keyed by it.
pub struct PolicyGateway {
    inner: Arc<dyn ToolProvider>,
    engine: Arc<PolicyEngine>,
    pending: DashMap<String, PendingEntry>,
}

impl PolicyGateway {
    pub fn new(inner: Arc<dyn ToolProvider>, engine: Arc<PolicyEngine>) -> Self {
        Self {
            inner,
            engine,
            pending: DashMap::new(),
        }
    }

    /// Execute one tool call under policy, per §4.3's three-step
    /// algorithm. `cancel` races the `ASK` wait so an outer cancellation
    /// resolves a stuck pending call with `POLICY_DENIED_ABORT` rather than
    /// hanging forever.
    pub async fn call(
        &self,
        call_id: &str,
        name: &str,
        args: Value,
        cancel: &CancellationToken,
    ) -> ToolCallResult {
        let request = PolicyRequest {
            name: name.to_string(),
            arguments_json: args.clone(),
        };

        let response = match self.engine.evaluate(&request).await {
            Ok(response) => response,
            Err(e) => {
                return ToolCallResult::reserved(
                    ReservedPolicyCode::PolicyEvaluatorError,
                    e.to_string(),
                )
            }
        };

        match response.decision {
            PolicyDecision::Allow => self.forward(name, args).await,
            PolicyDecision::DenyAbort => {
                ToolCallResult::reserved(ReservedPolicyCode::PolicyDeniedAbort, response.rationale)
            }
            PolicyDecision::DenyContinue => ToolCallResult::reserved(
                ReservedPolicyCode::PolicyDeniedContinue,
                response.rationale,
            ),
            PolicyDecision::Ask => {
                self.ask(call_id, name, args, response.rationale, cancel)
                    .await
            }
        }
    }

    async fn ask(
        &self,
        call_id: &str,
        name: &str,
        args: Value,
        rationale: String,
        cancel: &CancellationToken,
    ) -> ToolCallResult {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.pending.insert(
            call_id.to_string(),
            PendingEntry {
                info: PendingCallInfo {
                    call_id: call_id.to_string(),
                    name: name.to_string(),
                    arguments_json: args.clone(),
                    rationale: rationale.clone(),
                },
                resolve: tx,
            },
        );

        let resolution = tokio::select! {
            result = rx => result.unwrap_or(Resolution::DenyAbort),
            _ = cancel.cancelled() => {
                self.pending.remove(call_id);
                Resolution::DenyAbort
            }
        };
        self.pending.remove(call_id);

        match resolution {
            Resolution::Approve => self.forward(name, args).await,
            Resolution::DenyAbort => {
                ToolCallResult::reserved(ReservedPolicyCode::PolicyDeniedAbort, rationale)
            }
            Resolution::DenyContinue => {
                ToolCallResult::reserved(ReservedPolicyCode::PolicyDeniedContinue, rationale)
            }
        }
    }

    async fn forward(&self, name: &str, args: Value) -> ToolCallResult {
        let result = self.inner.call_tool(name, args).await;
        if result.reserved_code.is_some() {
            warn!(tool = name, "tool emitted a reserved policy code directly");
            return ToolCallResult::reserved(
                ReservedPolicyCode::PolicyBackendReservedMisuse,
                format!("tool '{name}' returned a reserved code without the gateway stamp"),
            );
        }
        result
    }

    /// Resolve a pending `ASK`. Idempotent: resolving an already-resolved
    /// or unknown `call_id` is a no-op, matching §5's "resolution is
    /// idempotent" invariant.
    pub fn decide_call(&self, call_id: &str, decision: ApprovalDecision) {
        if let Some((_, entry)) = self.pending.remove(call_id) {
            let resolution = match decision {
                ApprovalDecision::Approve => Resolution::Approve,
                ApprovalDecision::DenyAbort => Resolution::DenyAbort,
                ApprovalDecision::DenyContinue => Resolution::DenyContinue,
            };
            let _ = entry.resolve.send(resolution);
        }
    }

    /// The tool schemas available through this gateway, unfiltered by
    /// policy (policy decisions are per-call, not per-schema).
    pub async fn inner_list_tools(&self) -> Vec<crate::tool::ToolSchema> {
        self.inner.list_tools().await
    }

    /// Snapshot of all outstanding `ASK`s, for an admin surface.
    pub fn pending_calls(&self) -> Vec<PendingCallInfo> {
        self.pending
            .iter()
            .map(|entry| PendingCallInfo {
                call_id: entry.info.call_id.clone(),
                name: entry.info.name.clone(),
                arguments_json: entry.info.arguments_json.clone(),
                rationale: entry.info.rationale.clone(),
            })
            .collect()
    }

    /// Resolve every outstanding `ASK` with abort, used during
    /// `Runtime::close` so no pending call is left dangling.
    pub fn abort_all_pending(&self) {
        let call_ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for call_id in call_ids {
            self.decide_call(&call_id, ApprovalDecision::DenyAbort);
        }
    }
}
