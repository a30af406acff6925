//! `agentrt-core`: the core agent runtime.
//!
//! A general-purpose loop that drives an LLM conversation through
//! alternating phases of sampling model output and executing the tool
//! calls it requests, subject to pluggable policy, approval, and
//! termination controls. See `DESIGN.md` at the workspace root for the
//! grounding ledger behind each module below.

pub mod agent;
pub mod ai;
pub mod compositor;
pub mod config;
pub mod error;
pub mod event;
pub mod handlers;
pub mod mcp;
pub mod notifications;
pub mod paths;
pub mod persistence;
pub mod policy;
pub mod process;
pub mod runtime;
pub mod tool;

pub use agent::{Agent, AgentError, AgentLoopConfig, AgentOutcome, ToolPolicy};
pub use config::RuntimeConfig;
pub use error::{CloseError, ReservedPolicyCode, RuntimeError};
pub use event::{Event, EventKind, Transcript};
pub use handlers::{Handler, LoopDecision};
pub use notifications::{NotificationsBuffer, NotificationsHandler};
pub use policy::PolicyAdminTool;
pub use runtime::Runtime;
pub use tool::{ContentBlock, ToolCallResult, ToolProvider, ToolSchema};
