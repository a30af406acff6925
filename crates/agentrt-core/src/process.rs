//! Sandboxed one-shot subprocess execution, used by the policy engine to
//! run a user policy program under a wall-time bound.
//!
//! Trimmed down from the teacher's `process::ProcessRegistry`, which tracks
//! long-lived background processes across users. A policy evaluation is a
//! single run-to-completion child with no tracked lifetime, so the
//! multi-tenant registry and suspend/resume bookkeeping don't carry over;
//! what's kept is the teacher's process-group-kill idiom (`process_group(0)`
//! on unix so a runaway evaluator's children die with it) and its
//! `kill_on_drop` habit from `mcp::transport::StdioTransport`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;

/// Output of a sandboxed run.
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Runs `command` with `env` set, a fresh process group on unix, and a
/// wall-time bound. Returns `Err` only on spawn failure or timeout; a
/// non-zero exit is reported in `SandboxOutput::exit_code`, not as an
/// `Err`, so callers can distinguish "ran and failed" from "never ran".
pub async fn run_sandboxed(
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
    working_dir: &Path,
    timeout: Duration,
) -> Result<SandboxOutput> {
    let mut cmd = Command::new(command);
    cmd.args(args);
    cmd.current_dir(working_dir);
    cmd.envs(env);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn policy sandbox: {command}"))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| anyhow!("policy sandbox exceeded {:?} wall-time bound", timeout))?
        .context("policy sandbox process I/O failed")?;

    Ok(SandboxOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_and_captures_stdout() {
        let out = run_sandboxed(
            "sh",
            &["-c".to_string(), "echo hello".to_string()],
            &HashMap::new(),
            Path::new("."),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn times_out_on_runaway_process() {
        let result = run_sandboxed(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            &HashMap::new(),
            Path::new("."),
            Duration::from_millis(50),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn env_vars_are_passed_through() {
        let mut env = HashMap::new();
        env.insert("AGENTRT_TEST_VALUE".to_string(), "42".to_string());
        let out = run_sandboxed(
            "sh",
            &["-c".to_string(), "echo $AGENTRT_TEST_VALUE".to_string()],
            &env,
            Path::new("."),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out.stdout.trim(), "42");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_errored() {
        let out = run_sandboxed(
            "sh",
            &["-c".to_string(), "exit 7".to_string()],
            &HashMap::new(),
            Path::new("."),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, Some(7));
    }
}
