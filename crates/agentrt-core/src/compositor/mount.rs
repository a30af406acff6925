//! One entry in the compositor's mount table.

use std::collections::HashSet;
use std::sync::Arc;

use crate::mcp::McpClient;
use crate::tool::ToolProvider;

/// The prefix naming rule from §6: `^[a-z][a-z0-9_]{0,49}$`.
pub fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() {
        return false;
    }
    prefix.len() <= 50
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// The backing implementation behind one mount.
pub enum MountKind {
    InProc(Arc<dyn ToolProvider>),
    Mcp(Arc<McpClient>),
}

impl MountKind {
    pub async fn list_tools(&self) -> Vec<crate::tool::ToolSchema> {
        match self {
            MountKind::InProc(provider) => provider.list_tools().await,
            MountKind::Mcp(client) => client
                .get_tools()
                .await
                .into_iter()
                .map(|t| crate::tool::ToolSchema {
                    name: t.name,
                    description: t.description.unwrap_or_default(),
                    input_schema: t.input_schema,
                    output_schema: None,
                })
                .collect(),
        }
    }

    pub async fn call_tool(&self, tool: &str, args: serde_json::Value) -> crate::tool::ToolCallResult {
        match self {
            MountKind::InProc(provider) => provider.call_tool(tool, args).await,
            MountKind::Mcp(client) => match client.call_tool(tool, args).await {
                Ok(result) => crate::tool::ToolCallResult {
                    content: result
                        .content
                        .iter()
                        .map(|c| crate::tool::ContentBlock::Text {
                            text: c.to_string(),
                        })
                        .collect(),
                    structured_content: None,
                    is_error: result.is_error,
                    reserved_code: None,
                },
                Err(e) => crate::tool::ToolCallResult::error(format!("mcp error: {e}")),
            },
        }
    }
}

/// Per-mount subscription bookkeeping (§4.2): remembered so it can be
/// replayed to a remounted server under the same prefix, and dropped
/// without a remote unsubscribe call when the mount is detached.
#[derive(Debug, Default, Clone)]
pub struct MountSubscriptions {
    pub list_changed: bool,
    pub resource_uris: HashSet<String>,
}

pub struct MountEntry {
    pub prefix: String,
    pub kind: MountKind,
    pub pinned: bool,
    pub subscriptions: MountSubscriptions,
}
