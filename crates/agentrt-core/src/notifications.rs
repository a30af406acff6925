//! Per-session notifications buffer: coalesces resource-change
//! notifications into idempotent batches surfaced to the model as a single
//! system notice.
//!
//! Supplemented from the spec; the teacher has no MCP resource
//! notification concept at all. Built from scratch, grounded on the
//! per-session `RwLock<HashMap<...>>` bookkeeping idiom seen in
//! `McpManager` (`clients: RwLock<HashMap<String, Arc<McpClient>>>`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::compositor::{Compositor, MountNotification};
use crate::event::{EventKind, Transcript};
use crate::handlers::{Handler, LoopDecision};
use crate::policy::PolicyEngine;

#[derive(Debug, Default, Clone)]
struct PrefixBatch {
    list_changed: bool,
    updated: HashSet<String>,
}

/// Coalesces `MountNotification`s and a policy-version watch into one
/// flushable batch per client session.
pub struct NotificationsBuffer {
    prefixes: RwLock<HashMap<String, PrefixBatch>>,
    last_seen_policy_version: RwLock<u64>,
}

#[derive(Debug, Serialize)]
pub struct ResourceBatch {
    pub list_changed: bool,
    pub updated: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PolicyBatch {
    pub changed: bool,
}

/// The drained snapshot, ready for `format`.
#[derive(Debug, Serialize)]
pub struct NotificationEnvelope {
    pub resources: HashMap<String, ResourceBatch>,
    pub policy: PolicyBatch,
}

impl NotificationEnvelope {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && !self.policy.changed
    }
}

impl NotificationsBuffer {
    pub fn new() -> Self {
        Self {
            prefixes: RwLock::new(HashMap::new()),
            last_seen_policy_version: RwLock::new(0),
        }
    }

    pub async fn record(&self, notification: MountNotification) {
        let mut prefixes = self.prefixes.write().await;
        match notification {
            MountNotification::ListChanged { prefix } => {
                prefixes.entry(prefix).or_default().list_changed = true;
            }
            MountNotification::ResourceUpdated { prefix, uri } => {
                prefixes.entry(prefix).or_default().updated.insert(uri);
            }
        }
    }

    /// Atomically snapshot and clear the buffer. `current_policy_version`
    /// is compared against the last-flushed version to compute
    /// `policy.changed`.
    pub async fn poll(&self, current_policy_version: u64) -> NotificationEnvelope {
        let mut prefixes = self.prefixes.write().await;
        let drained: HashMap<String, ResourceBatch> = prefixes
            .drain()
            .map(|(prefix, batch)| {
                (
                    prefix,
                    ResourceBatch {
                        list_changed: batch.list_changed,
                        updated: batch.updated.into_iter().collect(),
                    },
                )
            })
            .collect();

        let mut last_seen = self.last_seen_policy_version.write().await;
        let changed = current_policy_version > *last_seen;
        *last_seen = current_policy_version;

        NotificationEnvelope {
            resources: drained,
            policy: PolicyBatch { changed },
        }
    }

    /// Format a batch as the `<system notification>...</system notification>`
    /// envelope injected as a `user_text` event.
    pub fn format(batch: &NotificationEnvelope) -> String {
        let json = serde_json::to_string(batch).unwrap_or_else(|_| "{}".to_string());
        format!("<system notification>\n{json}\n</system notification>")
    }
}

impl Default for NotificationsBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the background task that drains the compositor's multicast
/// notification channel into `buffer`. One task per `Agent` run/session;
/// the task exits naturally once every sender side (every mount) drops,
/// which happens when the compositor itself is dropped.
pub fn spawn_forwarding(buffer: Arc<NotificationsBuffer>, compositor: &Compositor) -> tokio::task::JoinHandle<()> {
    let mut rx = compositor.subscribe_notifications();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => buffer.record(notification).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Reducer participant that surfaces coalesced notifications to the model.
///
/// Polls the buffer in `on_before_sample`, one call per loop iteration, so
/// a notification recorded mid-turn N (while tool calls from turn N are
/// still executing) is only ever visible starting at turn N+1's reducer
/// pass — never the same iteration that produced the triggering tool call.
/// Grounded on the spec's explicit ordering rule in §4.7.
pub struct NotificationsHandler {
    buffer: Arc<NotificationsBuffer>,
    policy_engine: Arc<PolicyEngine>,
}

impl NotificationsHandler {
    pub fn new(buffer: Arc<NotificationsBuffer>, policy_engine: Arc<PolicyEngine>) -> Self {
        Self {
            buffer,
            policy_engine,
        }
    }
}

#[async_trait]
impl Handler for NotificationsHandler {
    async fn on_before_sample(&self, _transcript: &Transcript) -> LoopDecision {
        let envelope = self.buffer.poll(self.policy_engine.version()).await;
        if envelope.is_empty() {
            return LoopDecision::NoAction;
        }
        LoopDecision::InjectItems {
            items: vec![EventKind::UserText {
                text: NotificationsBuffer::format(&envelope),
            }],
        }
    }

    fn name(&self) -> &str {
        "notifications_buffer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_drains_and_resets_buffer() {
        let buffer = NotificationsBuffer::new();
        buffer
            .record(MountNotification::ListChanged {
                prefix: "docs".to_string(),
            })
            .await;
        buffer
            .record(MountNotification::ResourceUpdated {
                prefix: "docs".to_string(),
                uri: "resource://docs/foo".to_string(),
            })
            .await;
        buffer
            .record(MountNotification::ResourceUpdated {
                prefix: "docs".to_string(),
                uri: "resource://docs/bar".to_string(),
            })
            .await;

        let batch = buffer.poll(0).await;
        let docs = batch.resources.get("docs").unwrap();
        assert!(docs.list_changed);
        assert_eq!(docs.updated.len(), 2);

        let empty = buffer.poll(0).await;
        assert!(empty.resources.is_empty());
    }

    #[tokio::test]
    async fn policy_version_bump_is_reported_once() {
        let buffer = NotificationsBuffer::new();
        let first = buffer.poll(1).await;
        assert!(first.policy.changed);
        let second = buffer.poll(1).await;
        assert!(!second.policy.changed);
        let third = buffer.poll(2).await;
        assert!(third.policy.changed);
    }

    #[test]
    fn format_wraps_in_system_notification_tags() {
        let batch = NotificationEnvelope {
            resources: HashMap::new(),
            policy: PolicyBatch { changed: false },
        };
        let text = NotificationsBuffer::format(&batch);
        assert!(text.starts_with("<system notification>"));
        assert!(text.ends_with("</system notification>"));
    }
}
