//! Sidecar/runtime wiring: the one place that builds a compositor, a
//! policy engine/gateway, and an event store from a single
//! [`RuntimeConfig`], mounts the configured MCP servers, and owns
//! deterministic shutdown.
//!
//! Grounded on `mcp::manager::McpManager::connect_all`: parallel connect
//! via `futures::future::join_all`, warn-and-continue when one server
//! fails rather than failing the whole startup. The broader role this
//! module plays — the single struct every other subsystem is constructed
//! through — mirrors `krusty_server::AppState`, minus everything that
//! belongs to the HTTP surface (out of scope per the spec).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::compositor::Compositor;
use crate::config::RuntimeConfig;
use crate::error::CloseError;
use crate::mcp::McpServerConfig;
use crate::notifications::NotificationsBuffer;
use crate::persistence::EventStore;
use crate::policy::{PolicyAdminTool, PolicyEngine, PolicyGateway};
use crate::tool::ToolProvider;

/// Everything one running agent process needs: the aggregated tool
/// surface, the policy gateway wrapping it, and the event store every
/// `Agent` run persists through.
pub struct Runtime {
    compositor: Arc<Compositor>,
    gateway: Arc<PolicyGateway>,
    policy_engine: Arc<PolicyEngine>,
    admin_tool: Arc<PolicyAdminTool>,
    store: Arc<EventStore>,
    notifications: Arc<NotificationsBuffer>,
    notifications_task: tokio::task::JoinHandle<()>,
    config: RuntimeConfig,
    working_dir: PathBuf,
}

impl Runtime {
    /// Build a runtime from `config`: mount every server in
    /// `config.mcp_servers` in parallel, open the event store, and wrap
    /// the resulting compositor with a fresh `PolicyGateway`. A server
    /// that fails to mount is logged and skipped — one bad MCP server
    /// config must not prevent the runtime from starting at all, mirroring
    /// `McpManager::connect_all`'s warn-and-continue behavior.
    pub async fn start(config: RuntimeConfig, working_dir: PathBuf) -> anyhow::Result<Self> {
        let compositor = Compositor::new(working_dir.clone());
        Self::mount_configured_servers(&compositor, &config).await;

        let policy_engine = Arc::new(PolicyEngine::new(
            working_dir.clone(),
            Duration::from_millis(config.policy_eval_timeout_ms),
        ));
        let gateway = Arc::new(PolicyGateway::new(
            compositor.clone() as Arc<dyn ToolProvider>,
            policy_engine.clone(),
        ));
        let store = Arc::new(EventStore::open(&config.resolved_db_path())?);

        // Not mounted under the compositor: the admin surface is exactly
        // the "policy/admin/UI helpers" the gateway's interposition rule
        // (§4.3) carves out, so it must never itself pass through
        // `PolicyGateway::call` — it's reached directly, by whatever
        // out-of-process admin channel a deployer builds (out of scope
        // here), not by the model's tool-call mechanism.
        let admin_tool = Arc::new(PolicyAdminTool::new(gateway.clone(), policy_engine.clone()));

        let notifications = Arc::new(NotificationsBuffer::new());
        let notifications_task = crate::notifications::spawn_forwarding(notifications.clone(), &compositor);

        Ok(Self {
            compositor,
            gateway,
            policy_engine,
            admin_tool,
            store,
            notifications,
            notifications_task,
            config,
            working_dir,
        })
    }

    /// The out-of-band admin tool surface (`decide_call`, `list_pending`,
    /// `validate_policy`/`propose_policy`/`set_policy`) — deliberately not
    /// reachable through `gateway()`'s model-facing dispatch.
    pub fn admin_tool(&self) -> &Arc<PolicyAdminTool> {
        &self.admin_tool
    }

    /// The buffer fed by this runtime's compositor; pass a
    /// [`crate::notifications::NotificationsHandler`] wrapping this into
    /// every `Agent`'s handler list so the turn-N+1 surfacing rule applies.
    pub fn notifications(&self) -> &Arc<NotificationsBuffer> {
        &self.notifications
    }

    async fn mount_configured_servers(compositor: &Arc<Compositor>, config: &RuntimeConfig) {
        let servers: Vec<(String, McpServerConfig)> = config
            .mcp_servers
            .servers
            .iter()
            .map(|(prefix, spec)| (prefix.clone(), spec.clone()))
            .collect();
        if servers.is_empty() {
            return;
        }

        tracing::info!(count = servers.len(), "mounting configured MCP servers");
        let mounts = servers.iter().map(|(prefix, spec)| {
            let compositor = compositor.clone();
            async move {
                let result = compositor.mount_server(prefix, spec).await;
                (prefix.clone(), result)
            }
        });
        let results = futures::future::join_all(mounts).await;

        for (prefix, result) in results {
            if let Err(e) = result {
                tracing::warn!(prefix = %prefix, error = %e, "failed to mount configured MCP server");
            } else {
                tracing::info!(prefix = %prefix, "mounted configured MCP server");
            }
        }
    }

    pub fn compositor(&self) -> &Arc<Compositor> {
        &self.compositor
    }

    pub fn gateway(&self) -> &Arc<PolicyGateway> {
        &self.gateway
    }

    pub fn policy_engine(&self) -> &Arc<PolicyEngine> {
        &self.policy_engine
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Deterministic shutdown: abort every outstanding policy `ASK` first
    /// so no caller is left waiting on a decision that will never arrive,
    /// then drain persistence. This is the raising form from the Open
    /// Question recorded in `DESIGN.md` — any drain failure is returned,
    /// never swallowed.
    pub async fn close(self) -> Result<(), CloseError> {
        self.gateway.abort_all_pending();
        self.notifications_task.abort();
        self.store.close().await
    }
}
