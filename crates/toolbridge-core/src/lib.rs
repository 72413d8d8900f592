//! toolbridge core library
//!
//! Relays tool calls from a foreground process to a capability host through
//! a relay process. Both hops are newline-delimited JSON over child-process
//! stdio, driven by the same correlated [`engine`] and guarded by the same
//! connection [`state`] machine.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod framing;
pub mod mcp;
pub mod relay;
pub mod session;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use bridge::{Bridge, HostSession};
pub use config::{BridgeConfig, load_config};
pub use error::{BridgeError, BridgeResult, ErrorCategory};
pub use relay::RelayServer;
pub use session::{ConnectionManager, HopClient, InstallationProbe};
pub use state::{ConnectionEvent, ConnectionState};
pub use types::{ServerInfo, ToolDescriptor, ToolResult};
