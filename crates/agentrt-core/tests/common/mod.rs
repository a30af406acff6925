//! Shared fixtures for the end-to-end integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use agentrt_core::ai::{ModelProvider, ProviderError, ResponseItem, ResponsesRequest, ResponsesResponse, Usage};
use agentrt_core::policy::engine::PolicyProgram;
use agentrt_core::tool::{ToolCallResult, ToolProvider, ToolSchema};

/// An in-process tool that echoes back its `text` argument.
pub struct EchoTool;

#[async_trait]
impl ToolProvider for EchoTool {
    async fn list_tools(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "echo".to_string(),
            description: "echoes the 'text' argument back".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"],
            }),
            output_schema: None,
        }]
    }

    async fn call_tool(&self, _name: &str, args: Value) -> ToolCallResult {
        ToolCallResult::success(args.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string())
    }
}

/// An in-process tool whose single `wait` call sleeps briefly before
/// returning, used to demonstrate that parallel dispatch overlaps waits
/// instead of summing them.
pub struct SlowTool {
    pub delay_ms: u64,
}

#[async_trait]
impl ToolProvider for SlowTool {
    async fn list_tools(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "wait".to_string(),
            description: "sleeps then returns its 'id' argument".to_string(),
            input_schema: json!({"type": "object", "properties": {"id": {"type": "string"}}}),
            output_schema: None,
        }]
    }

    async fn call_tool(&self, _name: &str, args: Value) -> ToolCallResult {
        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        ToolCallResult::success(args.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string())
    }
}

/// A policy program shaped as an inline shell script: self-test always
/// passes, `decide` returns a fixed decision for every call.
pub fn fixed_decision_script(decision_json: &str) -> PolicyProgram {
    let script = format!(
        r#"
        if [ -n "$AGENTRT_POLICY_SELFTEST" ]; then exit 0; fi
        echo '{decision_json}'
        "#
    );
    PolicyProgram {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script],
        env: HashMap::new(),
    }
}

/// Replays a fixed sequence of model responses, one per call to
/// `responses_create`; the last response repeats once the script is
/// exhausted.
pub struct ScriptedProvider {
    responses: Vec<ResponsesResponse>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ResponsesResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn responses_create(
        &self,
        _request: ResponsesRequest,
    ) -> Result<ResponsesResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = call.min(self.responses.len() - 1);
        Ok(self.responses[idx].clone())
    }
}

pub fn tool_call_response(id: &str, name: &str, call_id: &str, args: Value) -> ResponsesResponse {
    ResponsesResponse {
        id: id.to_string(),
        output: vec![ResponseItem::FunctionCall {
            name: name.to_string(),
            arguments: args,
            call_id: call_id.to_string(),
        }],
        usage: Usage::default(),
    }
}

pub fn multi_tool_call_response(id: &str, calls: Vec<(&str, &str, Value)>) -> ResponsesResponse {
    ResponsesResponse {
        id: id.to_string(),
        output: calls
            .into_iter()
            .map(|(name, call_id, args)| ResponseItem::FunctionCall {
                name: name.to_string(),
                arguments: args,
                call_id: call_id.to_string(),
            })
            .collect(),
        usage: Usage::default(),
    }
}

pub fn text_response(id: &str, text: &str) -> ResponsesResponse {
    ResponsesResponse {
        id: id.to_string(),
        output: vec![ResponseItem::Message {
            text: text.to_string(),
        }],
        usage: Usage::default(),
    }
}
