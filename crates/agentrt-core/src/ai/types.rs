//! Provider-facing wire types for the `ModelProvider` contract.
//!
//! These are NOT transcript types (see `crate::event`) — they are the
//! shapes a `ModelProvider` implementation sends/receives over the wire,
//! mirroring `ai::types::Usage`/`ModelMessage` in the teacher but collapsed
//! to the spec's single-request/single-response contract (no token-level
//! streaming; see the crate's NON-GOALS).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::ToolSchema;

/// Usage accounting, carried on `Event::Response` exactly as
/// `ai::types::Usage` defines it in the teacher. The distilled spec only
/// asks for "usage"; the richer cache-aware shape is supplemented because
/// the context-compaction story is keyed off it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    #[serde(default)]
    pub cache_creation_input_tokens: usize,
    #[serde(default)]
    pub cache_read_input_tokens: usize,
}

/// How the loop constrains the model's next turn, translated from
/// `AgentLoop::tool_policy` into the provider's tool-choice semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    AllowAny,
    Required,
    Forbidden,
    OneOf { names: Vec<String> },
}

/// One item the model produced in a sampling response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseItem {
    Message { text: String },
    FunctionCall {
        name: String,
        arguments: Value,
        call_id: String,
    },
    Reasoning { data: Value },
}

/// Outgoing request built from the transcript and the effective tool
/// policy for this turn.
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub input: Value,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: ToolChoice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_summary: Option<String>,
}

/// The provider's response to one `responses_create` call.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesResponse {
    pub id: String,
    pub output: Vec<ResponseItem>,
    pub usage: Usage,
}
