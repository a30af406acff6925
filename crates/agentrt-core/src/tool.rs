//! The tool provider abstraction.
//!
//! Grounded on `tools::registry::Tool` in the teacher: an `async_trait`
//! with a schema and a single execution entry point. Renamed `execute` to
//! `call_tool` to match the spec's vocabulary, and the rich `ToolContext`
//! (working directory, permission mode, git identity) is dropped — that
//! belongs to individual tool implementations a caller mounts under the
//! compositor, not to the kernel's dispatch contract.

use async_trait::async_trait;
use serde_json::Value;

/// `{name, description, input_schema, output_schema?}`, the wire shape a
/// `ToolProvider` advertises via `list_tools`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// A single text or image block in a tool result, mirroring the MCP content
/// shape (`mcp::protocol::McpContent` in the teacher) generalized to the
/// provider-agnostic kernel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { data: String, mime_type: String },
}

impl std::fmt::Display for ContentBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentBlock::Text { text } => write!(f, "{text}"),
            ContentBlock::Image { mime_type, .. } => write!(f, "[image: {mime_type}]"),
        }
    }
}

/// The result of a `call_tool` invocation.
///
/// Errors are normal return values (`is_error: true`) except for the
/// distinguished reserved codes the policy gateway produces; those are
/// carried out-of-band via `ToolCallResult::reserved_code`, never by
/// string-matching the content.
#[derive(Debug, Clone, Default)]
pub struct ToolCallResult {
    pub content: Vec<ContentBlock>,
    pub structured_content: Option<Value>,
    pub is_error: bool,
    pub reserved_code: Option<crate::error::ReservedPolicyCode>,
}

impl ToolCallResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            structured_content: None,
            is_error: false,
            reserved_code: None,
        }
    }

    pub fn success_json(structured_content: Value) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: structured_content.to_string(),
            }],
            structured_content: Some(structured_content),
            is_error: false,
            reserved_code: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            structured_content: None,
            is_error: true,
            reserved_code: None,
        }
    }

    pub fn reserved(code: crate::error::ReservedPolicyCode, rationale: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: format!("{}: {}", code.message(), rationale.into()),
            }],
            structured_content: None,
            is_error: true,
            reserved_code: Some(code),
        }
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Uniform capability to list tools and invoke one by name.
///
/// Implementations: in-process function tools, MCP clients bridging to
/// remote stdio servers (`crate::mcp::client::McpClient`), and the
/// compositor itself (which is, recursively, a `ToolProvider`).
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn list_tools(&self) -> Vec<ToolSchema>;
    async fn call_tool(&self, name: &str, args: Value) -> ToolCallResult;
}

/// An in-process tool backed by a plain async closure-like handler,
/// analogous to the teacher registering one struct per `Tool` impl — this
/// is the minimal single-tool provider used to mount a function directly
/// without writing a whole struct.
#[async_trait]
pub trait FnTool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    async fn call(&self, args: Value) -> ToolCallResult;
}

/// Wraps a single `FnTool` as a one-tool `ToolProvider`, so it can be
/// mounted under the compositor like any multi-tool server.
pub struct SingleToolProvider<T: FnTool> {
    tool: T,
}

impl<T: FnTool> SingleToolProvider<T> {
    pub fn new(tool: T) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl<T: FnTool> ToolProvider for SingleToolProvider<T> {
    async fn list_tools(&self) -> Vec<ToolSchema> {
        vec![self.tool.schema()]
    }

    async fn call_tool(&self, name: &str, args: Value) -> ToolCallResult {
        let schema = self.tool.schema();
        if name != schema.name {
            return ToolCallResult::error(format!("unknown tool: {name}"));
        }
        self.tool.call(args).await
    }
}
