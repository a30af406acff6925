//! The admin tool surface for the approval flow: resolving pending `ASK`s
//! and managing the installed policy source.
//!
//! Mounted under the compositor (pinned, like `resources`/
//! `compositor_meta`) so the same qualified-tool-name dispatch the agent
//! already uses reaches it — no separate admin transport. `list_pending`
//! stands in for the spec's "pending entries exposed as a read-only
//! resource at a well-known URI": this crate's resource plumbing
//! (`compositor::read_resource`) is backed entirely by remote MCP mounts,
//! so an in-process registry with no MCP server behind it is surfaced as
//! a tool instead — recorded as an implementer decision in `DESIGN.md`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{ToolCallResult, ToolProvider, ToolSchema};

use super::engine::PolicyProgram;
use super::gateway::{ApprovalDecision, PolicyGateway};
use super::PolicyEngine;
use std::sync::Arc;

pub struct PolicyAdminTool {
    gateway: Arc<PolicyGateway>,
    engine: Arc<PolicyEngine>,
}

impl PolicyAdminTool {
    pub fn new(gateway: Arc<PolicyGateway>, engine: Arc<PolicyEngine>) -> Self {
        Self { gateway, engine }
    }

    fn parse_program(args: &Value) -> Result<PolicyProgram, ToolCallResult> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolCallResult::error("missing 'command'"))?
            .to_string();
        let args_list = match args.get("args") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().unwrap_or_default().to_string())
                .collect(),
            Some(_) => return Err(ToolCallResult::error("'args' must be an array of strings")),
        };
        let env = match args.get("env") {
            None => Default::default(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect(),
            Some(_) => return Err(ToolCallResult::error("'env' must be an object of strings")),
        };
        Ok(PolicyProgram {
            command,
            args: args_list,
            env,
        })
    }
}

#[async_trait]
impl ToolProvider for PolicyAdminTool {
    async fn list_tools(&self) -> Vec<ToolSchema> {
        vec![
            ToolSchema {
                name: "decide_call".to_string(),
                description: "Resolve a pending ASK by call_id with approve/deny_abort/deny_continue".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "call_id": {"type": "string"},
                        "decision": {"type": "string", "enum": ["approve", "deny_abort", "deny_continue"]},
                    },
                    "required": ["call_id", "decision"],
                }),
                output_schema: None,
            },
            ToolSchema {
                name: "list_pending".to_string(),
                description: "List pending ASK entries awaiting a decision".to_string(),
                input_schema: json!({"type": "object", "properties": {}}),
                output_schema: None,
            },
            ToolSchema {
                name: "validate_policy".to_string(),
                description: "Dry-run a candidate policy program's TEST_CASES without installing it".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string"},
                        "args": {"type": "array", "items": {"type": "string"}},
                        "env": {"type": "object"},
                    },
                    "required": ["command"],
                }),
                output_schema: None,
            },
            ToolSchema {
                name: "propose_policy".to_string(),
                description: "Alias of validate_policy: check a candidate policy source before set_policy".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string"},
                        "args": {"type": "array", "items": {"type": "string"}},
                        "env": {"type": "object"},
                    },
                    "required": ["command"],
                }),
                output_schema: None,
            },
            ToolSchema {
                name: "set_policy".to_string(),
                description: "Install a new policy program; rejected if its TEST_CASES self-test fails".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string"},
                        "args": {"type": "array", "items": {"type": "string"}},
                        "env": {"type": "object"},
                    },
                    "required": ["command"],
                }),
                output_schema: None,
            },
        ]
    }

    async fn call_tool(&self, name: &str, args: Value) -> ToolCallResult {
        match name {
            "decide_call" => {
                let Some(call_id) = args.get("call_id").and_then(|v| v.as_str()) else {
                    return ToolCallResult::error("missing 'call_id'");
                };
                let Some(decision) = args.get("decision").and_then(|v| v.as_str()) else {
                    return ToolCallResult::error("missing 'decision'");
                };
                let decision = match decision {
                    "approve" => ApprovalDecision::Approve,
                    "deny_abort" => ApprovalDecision::DenyAbort,
                    "deny_continue" => ApprovalDecision::DenyContinue,
                    other => return ToolCallResult::error(format!("unknown decision '{other}'")),
                };
                if !self.gateway.pending_calls().iter().any(|p| p.call_id == call_id) {
                    return ToolCallResult::error(format!("not_found: no pending call '{call_id}'"));
                }
                self.gateway.decide_call(call_id, decision);
                ToolCallResult::success(format!("resolved {call_id}"))
            }
            "list_pending" => {
                let pending = self.gateway.pending_calls();
                ToolCallResult::success_json(json!(pending
                    .iter()
                    .map(|p| json!({
                        "call_id": p.call_id,
                        "name": p.name,
                        "arguments_json": p.arguments_json,
                        "rationale": p.rationale,
                    }))
                    .collect::<Vec<_>>()))
            }
            "validate_policy" | "propose_policy" => {
                let program = match Self::parse_program(&args) {
                    Ok(program) => program,
                    Err(result) => return result,
                };
                match self.engine.validate_policy(&program).await {
                    Ok(()) => ToolCallResult::success("policy self-test passed"),
                    Err(e) => ToolCallResult::error(e.to_string()),
                }
            }
            "set_policy" => {
                let program = match Self::parse_program(&args) {
                    Ok(program) => program,
                    Err(result) => return result,
                };
                match self.engine.set_policy(program).await {
                    Ok(version) => ToolCallResult::success_json(json!({"version": version})),
                    Err(e) => ToolCallResult::error(e.to_string()),
                }
            }
            other => ToolCallResult::error(format!("unknown policy admin tool: {other}")),
        }
    }
}
