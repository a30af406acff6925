//! Provider-facing types and the sampling contract.

pub mod provider;
pub mod retry;
pub mod types;

pub use provider::{HttpModelProvider, ModelProvider, ProviderError};
pub use types::{ResponseItem, ResponsesRequest, ResponsesResponse, ToolChoice, Usage};
