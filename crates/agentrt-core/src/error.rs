//! Closed error enum for the runtime's own semantic failures.
//!
//! `anyhow::Error` is used at I/O boundaries (storage, subprocess, transport)
//! exactly as the teacher does; this enum exists only for failures the spec
//! assigns specific meaning to, so callers can match on them instead of
//! string-sniffing.

use thiserror::Error;

/// Reserved MCP-style error codes the policy gateway may return.
///
/// Chosen once, in the `-32950` region, per the spec's "chosen once"
/// instruction. Never derive these from strings; match on the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedPolicyCode {
    PolicyDeniedAbort,
    PolicyDeniedContinue,
    PolicyEvaluatorError,
    PolicyBackendReservedMisuse,
}

impl ReservedPolicyCode {
    pub const fn code(self) -> i64 {
        match self {
            ReservedPolicyCode::PolicyDeniedAbort => -32950,
            ReservedPolicyCode::PolicyDeniedContinue => -32951,
            ReservedPolicyCode::PolicyEvaluatorError => -32952,
            ReservedPolicyCode::PolicyBackendReservedMisuse => -32953,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            ReservedPolicyCode::PolicyDeniedAbort => "denied by policy: turn aborted",
            ReservedPolicyCode::PolicyDeniedContinue => "denied by policy: turn continues",
            ReservedPolicyCode::PolicyEvaluatorError => "policy evaluator failed",
            ReservedPolicyCode::PolicyBackendReservedMisuse => {
                "tool returned a reserved code without the gateway stamp"
            }
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        [
            ReservedPolicyCode::PolicyDeniedAbort,
            ReservedPolicyCode::PolicyDeniedContinue,
            ReservedPolicyCode::PolicyEvaluatorError,
            ReservedPolicyCode::PolicyBackendReservedMisuse,
        ]
        .into_iter()
        .find(|c| c.code() == code)
    }
}

/// Semantic errors the spec calls out by name.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("context length exceeded (tokens_used={tokens_used}, limit={limit})")]
    ContextLengthExceeded { tokens_used: usize, limit: usize },

    #[error("{}: {rationale}", .code.message())]
    PolicyDenied {
        code: ReservedPolicyCode,
        rationale: String,
        /// Always true for gateway-originated denials; see
        /// `ReservedPolicyCode::PolicyBackendReservedMisuse` for the
        /// alternative.
        stamp: bool,
    },

    #[error("policy evaluator error: {0}")]
    PolicyEvaluatorError(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("cancelled")]
    Cancelled,
}

impl RuntimeError {
    /// The error's code, if it corresponds to one of the reserved codes.
    pub fn reserved_code(&self) -> Option<ReservedPolicyCode> {
        match self {
            RuntimeError::PolicyDenied { code, .. } => Some(*code),
            RuntimeError::PolicyEvaluatorError(_) => Some(ReservedPolicyCode::PolicyEvaluatorError),
            _ => None,
        }
    }
}

/// Aggregated drain failures from `Runtime::close`.
///
/// The source has two variants of "close" — one returning a best-effort
/// error string, one raising an exception group. This implementation picks
/// the raising form: `close` returns `Err(CloseError)` aggregating every
/// drain failure, never swallowing one silently.
#[derive(Debug, Error)]
#[error("{} persistence task(s) failed to drain: {}", .0.len(), join_errors(.0))]
pub struct CloseError(pub Vec<anyhow::Error>);

fn join_errors(errors: &[anyhow::Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
