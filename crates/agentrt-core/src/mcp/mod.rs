//! Model Context Protocol plumbing: wire types, stdio transport, and a
//! client for one remote server. The compositor (`crate::compositor`)
//! mounts many of these under namespaced prefixes.

pub mod client;
pub mod config;
pub mod protocol;
pub mod transport;

pub use client::{McpClient, McpNotification};
pub use config::{McpServerConfig, McpServersConfig};
pub use transport::StdioTransport;
