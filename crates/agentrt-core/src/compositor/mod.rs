//! The MCP compositor: mounts many tool/resource providers under
//! namespaced prefixes and exposes one aggregated surface.
//!
//! Generalizes `McpManager::connect`/`disconnect` in the teacher, which is
//! single-namespace (server name only); this adds the prefix-rewrite step
//! the spec requires (`{prefix}_{tool}`), generalizing the one-off
//! `mcp__{server}_{tool}` format the teacher used only for
//! `McpTool::full_name`.

pub mod infra;
pub mod mount;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

use crate::mcp::{McpClient, McpNotification, McpServerConfig};
use crate::tool::{ToolCallResult, ToolProvider, ToolSchema};

use mount::{is_valid_prefix, MountEntry, MountKind, MountSubscriptions};

/// A resource-change notification, already rewritten with its mount
/// prefix, multicast to every subscriber via `subscribe_notifications`.
#[derive(Debug, Clone)]
pub enum MountNotification {
    ListChanged { prefix: String },
    ResourceUpdated { prefix: String, uri: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    #[error("prefix '{0}' already mounted")]
    AlreadyMounted(String),
    #[error("invalid prefix '{0}': must match ^[a-z][a-z0-9_]{{0,49}}$")]
    InvalidPrefix(String),
    #[error("prefix '{0}' is pinned and cannot be unmounted")]
    Pinned(String),
    #[error("prefix '{0}' is not mounted")]
    NotMounted(String),
    #[error(transparent)]
    Connect(#[from] anyhow::Error),
}

/// Aggregates `N` mounted subservers behind one tool/resource surface.
pub struct Compositor {
    mounts: RwLock<HashMap<String, MountEntry>>,
    notify_tx: broadcast::Sender<MountNotification>,
    working_dir: PathBuf,
}

impl Compositor {
    /// Build a compositor with the two pinned infrastructure servers
    /// already mounted (`resources`, `compositor_meta`).
    pub fn new(working_dir: PathBuf) -> Arc<Self> {
        let (notify_tx, _rx) = broadcast::channel(1024);
        Arc::new_cyclic(|weak: &std::sync::Weak<Compositor>| {
            let compositor = Compositor {
                mounts: RwLock::new(HashMap::new()),
                notify_tx,
                working_dir,
            };
            compositor.insert_pinned_inproc(
                "resources",
                Arc::new(infra::ResourcesTool {
                    compositor: weak.clone(),
                }),
            );
            compositor.insert_pinned_inproc(
                "compositor_meta",
                Arc::new(infra::CompositorMetaTool {
                    compositor: weak.clone(),
                }),
            );
            compositor
        })
    }

    fn insert_pinned_inproc(&self, prefix: &str, provider: Arc<dyn ToolProvider>) {
        self.mounts.write().insert(
            prefix.to_string(),
            MountEntry {
                prefix: prefix.to_string(),
                kind: MountKind::InProc(provider),
                pinned: true,
                subscriptions: MountSubscriptions::default(),
            },
        );
    }

    /// Mount an in-process tool provider under `prefix`.
    pub fn mount_inproc(
        &self,
        prefix: &str,
        provider: Arc<dyn ToolProvider>,
        pinned: bool,
    ) -> Result<(), CompositorError> {
        self.reserve_prefix(prefix)?;
        self.mounts.write().insert(
            prefix.to_string(),
            MountEntry {
                prefix: prefix.to_string(),
                kind: MountKind::InProc(provider),
                pinned,
                subscriptions: MountSubscriptions::default(),
            },
        );
        tracing::info!(prefix, "mounted in-process provider");
        Ok(())
    }

    /// Attach an external stdio MCP server transport under `prefix`.
    pub async fn mount_server(
        &self,
        prefix: &str,
        spec: &McpServerConfig,
    ) -> Result<(), CompositorError> {
        self.reserve_prefix(prefix)?;

        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<McpNotification>();
        let client = McpClient::connect(prefix, spec, &self.working_dir, Some(notify_tx)).await?;
        client.initialize().await?;
        client.list_tools().await?;
        let client = Arc::new(client);

        self.mounts.write().insert(
            prefix.to_string(),
            MountEntry {
                prefix: prefix.to_string(),
                kind: MountKind::Mcp(client),
                pinned: false,
                subscriptions: MountSubscriptions::default(),
            },
        );

        // Forward this mount's notifications with the prefix rewrite.
        let forward_tx = self.notify_tx.clone();
        let forward_prefix = prefix.to_string();
        tokio::spawn(async move {
            while let Some(notification) = notify_rx.recv().await {
                let rewritten = match notification {
                    McpNotification::ResourcesListChanged => MountNotification::ListChanged {
                        prefix: forward_prefix.clone(),
                    },
                    McpNotification::ResourceUpdated { uri } => MountNotification::ResourceUpdated {
                        prefix: forward_prefix.clone(),
                        uri: format!("resource://{}/{}", forward_prefix, strip_scheme(&uri)),
                    },
                };
                let _ = forward_tx.send(rewritten);
            }
        });

        tracing::info!(prefix, "mounted external MCP server");
        Ok(())
    }

    fn reserve_prefix(&self, prefix: &str) -> Result<(), CompositorError> {
        if !is_valid_prefix(prefix) {
            return Err(CompositorError::InvalidPrefix(prefix.to_string()));
        }
        if self.mounts.read().contains_key(prefix) {
            return Err(CompositorError::AlreadyMounted(prefix.to_string()));
        }
        Ok(())
    }

    /// Detach `prefix`. Drops its subscription set without issuing any
    /// remote unsubscribe call, per the spec's explicit rule.
    pub fn unmount_server(&self, prefix: &str) -> Result<(), CompositorError> {
        let mut mounts = self.mounts.write();
        match mounts.get(prefix) {
            None => Err(CompositorError::NotMounted(prefix.to_string())),
            Some(entry) if entry.pinned => Err(CompositorError::Pinned(prefix.to_string())),
            Some(_) => {
                mounts.remove(prefix);
                Ok(())
            }
        }
    }

    /// Subscribe to `list_changed` notifications for one mount prefix.
    pub fn subscribe_list_changed(&self, prefix: &str) -> Result<(), CompositorError> {
        let mut mounts = self.mounts.write();
        let entry = mounts
            .get_mut(prefix)
            .ok_or_else(|| CompositorError::NotMounted(prefix.to_string()))?;
        entry.subscriptions.list_changed = true;
        Ok(())
    }

    async fn read_resource(&self, uri: &str) -> ToolCallResult {
        let (prefix, origin_uri) = match split_prefixed_uri(uri) {
            Some(pair) => pair,
            None => return ToolCallResult::error(format!("malformed resource uri: {uri}")),
        };
        let client = {
            let mounts = self.mounts.read();
            match mounts.get(&prefix) {
                Some(MountEntry { kind: MountKind::Mcp(client), .. }) => client.clone(),
                Some(_) => return ToolCallResult::error(format!("mount '{prefix}' has no resources")),
                None => return ToolCallResult::error(format!("not_mounted: {prefix}")),
            }
        };
        match client.read_resource(&origin_uri).await {
            Ok(contents) => {
                let text = contents
                    .iter()
                    .filter_map(|c| c.text.clone())
                    .collect::<Vec<_>>()
                    .join("\n");
                ToolCallResult::success(text)
            }
            Err(e) => ToolCallResult::error(format!("read failed: {e}")),
        }
    }

    async fn subscribe_resource(&self, uri: &str) -> ToolCallResult {
        let (prefix, origin_uri) = match split_prefixed_uri(uri) {
            Some(pair) => pair,
            None => return ToolCallResult::error(format!("malformed resource uri: {uri}")),
        };
        let client = {
            let mut mounts = self.mounts.write();
            let Some(entry) = mounts.get_mut(&prefix) else {
                return ToolCallResult::error(format!("not_mounted: {prefix}"));
            };
            entry.subscriptions.resource_uris.insert(uri.to_string());
            match &entry.kind {
                MountKind::Mcp(client) => client.clone(),
                MountKind::InProc(_) => {
                    return ToolCallResult::success("subscribed (in-process mount, no remote call)")
                }
            }
        };
        match client.subscribe_resource(&origin_uri).await {
            Ok(()) => ToolCallResult::success(format!("subscribed to {uri}")),
            Err(e) => ToolCallResult::error(format!("subscribe failed: {e}")),
        }
    }

    async fn list_resources(&self) -> ToolCallResult {
        let clients: Vec<(String, Arc<McpClient>)> = self
            .mounts
            .read()
            .iter()
            .filter_map(|(prefix, entry)| match &entry.kind {
                MountKind::Mcp(client) => Some((prefix.clone(), client.clone())),
                MountKind::InProc(_) => None,
            })
            .collect();

        let mut all = Vec::new();
        for (prefix, client) in clients {
            if let Ok(resources) = client.list_resources().await {
                for r in resources {
                    all.push(json!({
                        "uri": format!("resource://{}/{}", prefix, strip_scheme(&r.uri)),
                        "name": r.name,
                        "description": r.description,
                    }));
                }
            }
        }
        ToolCallResult::success_json(Value::Array(all))
    }

    /// Snapshot of current mounts, for `compositor_meta`.
    pub async fn describe_mounts(&self) -> Value {
        let mut entries = Vec::new();
        let snapshot: Vec<(String, bool, MountKind_)> = {
            let mounts = self.mounts.read();
            mounts
                .values()
                .map(|e| (e.prefix.clone(), e.pinned, MountKind_::from(&e.kind)))
                .collect()
        };
        for (prefix, pinned, kind) in snapshot {
            let tool_count = match kind {
                MountKind_::InProc(provider) => provider.list_tools().await.len(),
                MountKind_::Mcp(client) => client.get_tools().await.len(),
            };
            entries.push(json!({"prefix": prefix, "pinned": pinned, "tool_count": tool_count}));
        }
        json!({"mounts": entries})
    }

    /// Subscribe to the compositor's multicast notification stream,
    /// consumed by `crate::notifications::NotificationsBuffer` per
    /// session.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<MountNotification> {
        self.notify_tx.subscribe()
    }
}

/// A cheap clone of the parts of `MountKind` `describe_mounts` needs,
/// avoiding holding the `RwLock` guard across `.await`.
enum MountKind_ {
    InProc(Arc<dyn ToolProvider>),
    Mcp(Arc<McpClient>),
}

impl From<&MountKind> for MountKind_ {
    fn from(kind: &MountKind) -> Self {
        match kind {
            MountKind::InProc(p) => MountKind_::InProc(p.clone()),
            MountKind::Mcp(c) => MountKind_::Mcp(c.clone()),
        }
    }
}

fn strip_scheme(uri: &str) -> &str {
    uri.strip_prefix("resource://").unwrap_or(uri)
}

/// Accepts both `resource://{prefix}/{path}` and a bare origin URI passed
/// through with an explicit prefix hint embedded by the caller — per §6,
/// `read` calls accept both the compositor-prefixed and the origin form,
/// so a prefixed URI is required to route a `read`/`subscribe` call.
fn split_prefixed_uri(uri: &str) -> Option<(String, String)> {
    let rest = uri.strip_prefix("resource://")?;
    let (prefix, path) = rest.split_once('/')?;
    Some((prefix.to_string(), format!("resource://{path}")))
}

#[async_trait]
impl ToolProvider for Compositor {
    async fn list_tools(&self) -> Vec<ToolSchema> {
        let snapshot: Vec<(String, MountKind_)> = {
            let mounts = self.mounts.read();
            mounts
                .values()
                .map(|e| (e.prefix.clone(), MountKind_::from(&e.kind)))
                .collect()
        };
        let mut all = Vec::new();
        for (prefix, kind) in snapshot {
            let tools = match kind {
                MountKind_::InProc(p) => p.list_tools().await,
                MountKind_::Mcp(c) => c
                    .get_tools()
                    .await
                    .into_iter()
                    .map(|t| ToolSchema {
                        name: t.name,
                        description: t.description.unwrap_or_default(),
                        input_schema: t.input_schema,
                        output_schema: None,
                    })
                    .collect(),
            };
            for mut tool in tools {
                tool.name = format!("{prefix}_{}", tool.name);
                all.push(tool);
            }
        }
        all
    }

    async fn call_tool(&self, qualified_name: &str, args: Value) -> ToolCallResult {
        let (tool, kind) = {
            let mounts = self.mounts.read();
            match resolve_qualified_tool_name(&mounts, qualified_name) {
                Some((tool, entry)) => (tool, MountKind_::from(&entry.kind)),
                None => {
                    return ToolCallResult::error(format!(
                        "not_mounted: {qualified_name}"
                    ))
                }
            }
        };
        match kind {
            MountKind_::InProc(provider) => provider.call_tool(&tool, args).await,
            MountKind_::Mcp(client) => MountKind::Mcp(client).call_tool(&tool, args).await,
        }
    }
}

/// Resolves a `{prefix}_{tool}` qualified name against the live mount
/// table. Prefixes may themselves contain underscores (the pinned
/// `compositor_meta` infra mount is one), so a naive split on the first
/// `_` misroutes calls to it; this instead tries every registered prefix
/// and keeps the longest match, which is unambiguous as long as no
/// mounted prefix is itself a proper prefix of another mounted prefix
/// followed by `_` — `reserve_prefix` does not forbid that today, so
/// longest-match is the correct tie-break.
fn resolve_qualified_tool_name<'a>(
    mounts: &'a HashMap<String, MountEntry>,
    qualified_name: &str,
) -> Option<(String, &'a MountEntry)> {
    mounts
        .keys()
        .filter_map(|prefix| {
            qualified_name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|tool| (prefix.as_str(), tool))
        })
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(prefix, tool)| (tool.to_string(), &mounts[prefix]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolCallResult as TCR;

    struct EchoProvider;

    #[async_trait]
    impl ToolProvider for EchoProvider {
        async fn list_tools(&self) -> Vec<ToolSchema> {
            vec![ToolSchema {
                name: "echo".to_string(),
                description: "echoes input".to_string(),
                input_schema: json!({"type": "object"}),
                output_schema: None,
            }]
        }

        async fn call_tool(&self, _name: &str, args: Value) -> TCR {
            TCR::success(args.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string())
        }
    }

    #[tokio::test]
    async fn mount_rewrites_tool_names() {
        let compositor = Compositor::new(PathBuf::from("."));
        compositor
            .mount_inproc("echo", Arc::new(EchoProvider), false)
            .unwrap();

        let tools = compositor.list_tools().await;
        assert!(tools.iter().any(|t| t.name == "echo_echo"));

        let result = compositor
            .call_tool("echo_echo", json!({"text": "hi"}))
            .await;
        assert_eq!(result.text(), "hi");
    }

    #[tokio::test]
    async fn duplicate_prefix_rejected() {
        let compositor = Compositor::new(PathBuf::from("."));
        compositor
            .mount_inproc("echo", Arc::new(EchoProvider), false)
            .unwrap();
        let err = compositor
            .mount_inproc("echo", Arc::new(EchoProvider), false)
            .unwrap_err();
        assert!(matches!(err, CompositorError::AlreadyMounted(_)));
    }

    #[tokio::test]
    async fn pinned_mount_refuses_unmount() {
        let compositor = Compositor::new(PathBuf::from("."));
        let err = compositor.unmount_server("resources").unwrap_err();
        assert!(matches!(err, CompositorError::Pinned(_)));
    }

    #[tokio::test]
    async fn dispatches_to_pinned_mount_with_underscore_in_prefix() {
        let compositor = Compositor::new(PathBuf::from("."));
        let result = compositor
            .call_tool("compositor_meta_list_mounts", json!({}))
            .await;
        assert!(!result.is_error, "{}", result.text());
        let value: Value = serde_json::from_str(&result.text()).unwrap();
        assert!(value.get("mounts").unwrap().as_array().unwrap().len() >= 2);
    }

    #[tokio::test]
    async fn unknown_prefix_fails_not_mounted() {
        let compositor = Compositor::new(PathBuf::from("."));
        let result = compositor.call_tool("ghost_tool", json!({})).await;
        assert!(result.is_error);
        assert!(result.text().contains("not_mounted"));
    }

    #[tokio::test]
    async fn mount_unmount_roundtrip_restores_tool_set() {
        let compositor = Compositor::new(PathBuf::from("."));
        let before: std::collections::HashSet<String> =
            compositor.list_tools().await.into_iter().map(|t| t.name).collect();

        compositor
            .mount_inproc("echo", Arc::new(EchoProvider), false)
            .unwrap();
        compositor.unmount_server("echo").unwrap();

        let after: std::collections::HashSet<String> =
            compositor.list_tools().await.into_iter().map(|t| t.name).collect();
        assert_eq!(before, after);
    }
}
