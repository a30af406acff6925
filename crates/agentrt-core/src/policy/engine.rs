//! Sandboxed evaluation of a user policy program.
//!
//! Inputs are passed via an environment variable rather than stdin, per the
//! wire contract in §6 — following the env-var-for-structured-input habit
//! seen in `mcp::config::expand_env_var`'s surrounding code. Every
//! evaluation is a fresh process (`crate::process::run_sandboxed`): no
//! state survives between calls, so a misbehaving program can't leak
//! memory or descriptors across calls.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{watch, RwLock};

use crate::error::RuntimeError;
use crate::process::run_sandboxed;

use super::{PolicyRequest, PolicyResponse};

const REQUEST_ENV_VAR: &str = "AGENTRT_POLICY_REQUEST";
const SELFTEST_ENV_VAR: &str = "AGENTRT_POLICY_SELFTEST";

/// The runnable location of a policy program: command + args, matching the
/// shape `mcp::config::McpServerConfig` already uses for external
/// processes.
#[derive(Debug, Clone)]
pub struct PolicyProgram {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

struct Installed {
    program: PolicyProgram,
    version: u64,
}

/// Runs a `PolicyProgram`, self-testing it against its own `TEST_CASES`
/// table before it's trusted, and tracking a version counter so
/// `set_policy` can be surfaced as a `policy.changed` notification.
pub struct PolicyEngine {
    installed: RwLock<Option<Installed>>,
    working_dir: PathBuf,
    eval_timeout: Duration,
    version_counter: AtomicU64,
    version_tx: watch::Sender<u64>,
}

impl PolicyEngine {
    pub fn new(working_dir: PathBuf, eval_timeout: Duration) -> Self {
        let (version_tx, _rx) = watch::channel(0);
        Self {
            installed: RwLock::new(None),
            working_dir,
            eval_timeout,
            version_counter: AtomicU64::new(0),
            version_tx,
        }
    }

    /// Install (or replace) the active policy program, running its
    /// self-test first. Bumps the version counter and notifies subscribers
    /// only on success — a program that fails its own tests never becomes
    /// active.
    pub async fn set_policy(&self, program: PolicyProgram) -> Result<u64, RuntimeError> {
        self.self_test(&program).await?;
        let version = self.version_counter.fetch_add(1, Ordering::SeqCst) + 1;
        *self.installed.write().await = Some(Installed {
            program,
            version,
        });
        let _ = self.version_tx.send(version);
        Ok(version)
    }

    /// Run a candidate program's `TEST_CASES` self-test without installing
    /// it, for the admin `validate_policy`/`propose_policy` tools — lets a
    /// caller check a policy source is sound before committing to
    /// `set_policy`.
    pub async fn validate_policy(&self, program: &PolicyProgram) -> Result<(), RuntimeError> {
        self.self_test(program).await
    }

    /// Current policy version, or 0 if no policy has ever been installed
    /// (an unset policy is treated as `ALLOW` for every call — see
    /// `PolicyGateway`).
    pub fn version(&self) -> u64 {
        self.version_counter.load(Ordering::SeqCst)
    }

    /// Subscribe to version bumps, consumed by `crate::notifications` to
    /// surface `policy.changed` in the notification envelope.
    pub fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    async fn self_test(&self, program: &PolicyProgram) -> Result<(), RuntimeError> {
        let mut env = program.env.clone();
        env.insert(SELFTEST_ENV_VAR.to_string(), "1".to_string());

        let output = run_sandboxed(
            &program.command,
            &program.args,
            &env,
            &self.working_dir,
            self.eval_timeout,
        )
        .await
        .map_err(|e| RuntimeError::PolicyEvaluatorError(e.to_string()))?;

        match output.exit_code {
            Some(0) => Ok(()),
            Some(1) => Err(RuntimeError::PolicyEvaluatorError(format!(
                "policy failed its own TEST_CASES: {}",
                output.stderr.trim()
            ))),
            Some(2) => Err(RuntimeError::PolicyEvaluatorError(format!(
                "policy self-test received malformed input: {}",
                output.stderr.trim()
            ))),
            other => Err(RuntimeError::PolicyEvaluatorError(format!(
                "policy self-test exited with unexpected code {other:?}"
            ))),
        }
    }

    /// Evaluate one tool call. An engine with no installed policy allows
    /// every call — the gateway is then a no-op passthrough, which matches
    /// a deployer who never configured a policy getting unblocked tool use
    /// rather than a hard failure.
    pub async fn evaluate(&self, request: &PolicyRequest) -> Result<PolicyResponse, RuntimeError> {
        let Some(installed) = self.installed.read().await.as_ref().map(|i| i.program.clone()) else {
            return Ok(PolicyResponse {
                decision: super::PolicyDecision::Allow,
                rationale: "no policy installed".to_string(),
            });
        };

        let request_json = serde_json::to_string(request)
            .map_err(|e| RuntimeError::PolicyEvaluatorError(format!("request serialize: {e}")))?;

        let mut env = installed.env.clone();
        env.insert(REQUEST_ENV_VAR.to_string(), request_json);

        let output = run_sandboxed(
            &installed.command,
            &installed.args,
            &env,
            &self.working_dir,
            self.eval_timeout,
        )
        .await
        .map_err(|e| RuntimeError::PolicyEvaluatorError(e.to_string()))?;

        match output.exit_code {
            Some(0) => parse_response(&output.stdout),
            Some(2) => Err(RuntimeError::PolicyEvaluatorError(format!(
                "policy received malformed input: {}",
                output.stderr.trim()
            ))),
            other => Err(RuntimeError::PolicyEvaluatorError(format!(
                "policy exited with code {other:?}: {}",
                output.stderr.trim()
            ))),
        }
    }
}

fn parse_response(stdout: &str) -> Result<PolicyResponse, RuntimeError> {
    let line = stdout.lines().next().unwrap_or("").trim();
    let value: Value = serde_json::from_str(line)
        .map_err(|e| RuntimeError::PolicyEvaluatorError(format!("malformed policy output: {e}")))?;
    serde_json::from_value(value)
        .map_err(|e| RuntimeError::PolicyEvaluatorError(format!("malformed policy response: {e}")))
}
