//! Runtime configuration, loaded from TOML via `serde`.
//!
//! Mirrors `mcp::config::McpConfig::load` in the teacher: read file, parse,
//! fall back to a sane default if absent.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mcp::config::McpServersConfig;

/// Top-level configuration for one `Runtime`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path to the sqlite event store; falls back to
    /// `paths::default_db_path()` when unset.
    pub db_path: Option<PathBuf>,

    /// Maximum sampling iterations per `Agent::run`, mirroring the
    /// teacher's `MAX_ITERATIONS` constant, made configurable.
    pub max_iterations: usize,

    /// Whether tool calls within one turn execute concurrently.
    pub parallel_tool_calls: bool,

    /// Bound on fan-out when `parallel_tool_calls` is set.
    pub max_parallel_tool_calls: usize,

    /// Optional deployer-set timeout for a policy ASK. The core gateway
    /// never imposes one itself (see the spec's Open Questions); when set,
    /// the caller wraps the approval wait in `tokio::time::timeout`.
    pub policy_ask_timeout_secs: Option<u64>,

    /// Wall-time bound for one policy sandbox evaluation.
    pub policy_eval_timeout_ms: u64,

    /// MCP servers to mount automatically when the runtime starts.
    pub mcp_servers: McpServersConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_iterations: 50,
            parallel_tool_calls: false,
            max_parallel_tool_calls: 8,
            policy_ask_timeout_secs: None,
            policy_eval_timeout_ms: 5_000,
            mcp_servers: McpServersConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load from a TOML file; an absent file yields `Self::default()`
    /// rather than an error, matching `McpConfig::load`'s behavior for a
    /// missing `.mcp.json`.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no runtime config found at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {path:?}"))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("failed to parse {path:?}"))?;
        tracing::info!("loaded runtime config from {:?}", path);
        Ok(config)
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(crate::paths::default_db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_default() {
        let config = RuntimeConfig::load(Path::new("/nonexistent/agentrt.toml"))
            .await
            .unwrap();
        assert_eq!(config.max_iterations, 50);
    }

    #[tokio::test]
    async fn parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentrt.toml");
        tokio::fs::write(&path, "max_iterations = 10\nparallel_tool_calls = true\n")
            .await
            .unwrap();
        let config = RuntimeConfig::load(&path).await.unwrap();
        assert_eq!(config.max_iterations, 10);
        assert!(config.parallel_tool_calls);
    }
}
