//! The two auto-mounted, always-pinned infrastructure servers: `resources`
//! (aggregate resource read/subscribe) and `compositor_meta` (read-only
//! description of current mounts).
//!
//! Neither has a teacher analogue (MCP resources aren't exercised anywhere
//! in the retrieved files) — built fresh, in the teacher's in-process
//! `Tool` idiom: a struct implementing the provider trait, registered like
//! any other mount. The cyclic compositor ↔ mount reference is a `Weak`
//! back-reference per the spec's design note.

use std::sync::Weak;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{ToolCallResult, ToolProvider, ToolSchema};

use super::Compositor;

pub struct ResourcesTool {
    pub(super) compositor: Weak<Compositor>,
}

#[async_trait]
impl ToolProvider for ResourcesTool {
    async fn list_tools(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema {
                name: "read".to_string(),
                description: "Read an aggregated resource by its compositor-prefixed or origin URI".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"uri": {"type": "string"}},
                    "required": ["uri"],
                }),
                output_schema: None,
            },
            ToolSchema {
                name: "subscribe".to_string(),
                description: "Subscribe to updates for a resource URI".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"uri": {"type": "string"}},
                    "required": ["uri"],
                }),
                output_schema: None,
            },
            ToolSchema {
                name: "list".to_string(),
                description: "List resources across all mounted servers".to_string(),
                input_schema: json!({"type": "object", "properties": {}}),
                output_schema: None,
            },
        ]
    }

    async fn call_tool(&self, name: &str, args: Value) -> ToolCallResult {
        let Some(compositor) = self.compositor.upgrade() else {
            return ToolCallResult::error("compositor no longer alive");
        };
        match name {
            "read" => {
                let Some(uri) = args.get("uri").and_then(|v| v.as_str()) else {
                    return ToolCallResult::error("missing 'uri'");
                };
                compositor.read_resource(uri).await
            }
            "subscribe" => {
                let Some(uri) = args.get("uri").and_then(|v| v.as_str()) else {
                    return ToolCallResult::error("missing 'uri'");
                };
                compositor.subscribe_resource(uri).await
            }
            "list" => compositor.list_resources().await,
            other => ToolCallResult::error(format!("unknown resources tool: {other}")),
        }
    }
}

pub struct CompositorMetaTool {
    pub(super) compositor: Weak<Compositor>,
}

#[async_trait]
impl ToolProvider for CompositorMetaTool {
    async fn list_tools(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "list_mounts".to_string(),
            description: "Describe currently mounted servers (prefix, pinned, tool count)".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
            output_schema: None,
        }]
    }

    async fn call_tool(&self, name: &str, _args: Value) -> ToolCallResult {
        if name != "list_mounts" {
            return ToolCallResult::error(format!("unknown compositor_meta tool: {name}"));
        }
        let Some(compositor) = self.compositor.upgrade() else {
            return ToolCallResult::error("compositor no longer alive");
        };
        ToolCallResult::success_json(compositor.describe_mounts().await)
    }
}
