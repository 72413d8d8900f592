//! Hop B: JSON-RPC 2.0 (MCP) client for the capability host
//!
//! The relay process speaks MCP over the host's stdin/stdout. Request ids are
//! sequential integers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolbridge_core::mcp::McpClient;
//! use toolbridge_core::engine::{ProcessConnector, SpawnSpec};
//!
//! let client = McpClient::new(ProcessConnector::new(SpawnSpec::new("mcp-server")));
//! client.open().await?;
//! let info = client.initialize().await?;
//! let tools = client.list_tools().await?;
//! ```

pub mod client;
pub mod protocol;
pub mod types;

pub use client::McpClient;
pub use protocol::{
    McpMessage, McpNotification, McpProtocol, McpRequest, McpResponse, McpRpcError,
};
pub use types::{ClientInfo, InitializeParams, InitializeResult};
