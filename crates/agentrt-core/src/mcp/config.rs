//! MCP server configuration, mirroring the teacher's `.mcp.json` parsing
//! but generalized: this crate has no credentials store of its own (out of
//! scope per the spec), so `${VAR}` expansion stops at the process
//! environment rather than falling back to an on-disk credential file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Local (stdio-spawned) server configuration, the only transport this
/// crate's compositor mounts directly — a remote/HTTP MCP transport is a
/// caller concern the compositor doesn't need to special-case, since any
/// `ToolProvider` can be mounted regardless of how it talks to its server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// `{prefix -> server config}` mounted automatically on runtime start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServersConfig {
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

impl McpServersConfig {
    /// Load from a `.mcp.json`-shaped file in `working_dir`, if present.
    pub async fn load(working_dir: &Path) -> Result<Self> {
        let config_path = working_dir.join(".mcp.json");
        if !config_path.exists() {
            tracing::debug!("no .mcp.json found at {:?}", config_path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("failed to read {config_path:?}"))?;

        #[derive(Deserialize)]
        struct Raw {
            #[serde(default, rename = "mcpServers")]
            mcp_servers: HashMap<String, McpServerConfig>,
        }
        let raw: Raw = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {config_path:?}"))?;

        let mut servers = HashMap::new();
        for (prefix, mut config) in raw.mcp_servers {
            for value in config.env.values_mut() {
                *value = expand_env_var(value);
            }
            servers.insert(prefix, config);
        }

        tracing::info!(
            "loaded mcp config with {} server(s) from {:?}",
            servers.len(),
            config_path
        );
        Ok(Self { servers })
    }
}

/// Expand `${VAR}` references against the process environment.
fn expand_env_var(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end_offset) = result[start..].find('}') else {
            break;
        };
        let end = start + end_offset;
        let var_name = &result[start + 2..end];
        let value = std::env::var(var_name).unwrap_or_else(|_| {
            tracing::warn!("no environment value for ${{{}}}", var_name);
            String::new()
        });
        result.replace_range(start..end + 1, &value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = McpServersConfig::load(dir.path()).await.unwrap();
        assert!(config.servers.is_empty());
    }

    #[tokio::test]
    async fn parses_local_server_and_expands_env() {
        std::env::set_var("AGENTRT_TEST_TOKEN", "secret123");
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(".mcp.json"),
            r#"{"mcpServers": {"files": {"command": "fs-mcp", "args": ["--ro"], "env": {"TOKEN": "${AGENTRT_TEST_TOKEN}"}}}}"#,
        )
        .await
        .unwrap();

        let config = McpServersConfig::load(dir.path()).await.unwrap();
        let files = config.servers.get("files").unwrap();
        assert_eq!(files.command, "fs-mcp");
        assert_eq!(files.env.get("TOKEN").unwrap(), "secret123");
    }
}
