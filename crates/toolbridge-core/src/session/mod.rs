//! Connection lifecycle for one hop
//!
//! [`ConnectionManager`] owns the hop's [`ConnectionState`] and drives a
//! [`HopClient`] through the transitions computed by
//! [`crate::state::transition`].
//!
//! [`ConnectionState`]: crate::state::ConnectionState

mod manager;
mod probe;

pub use manager::ConnectionManager;
pub use probe::{CommandProbe, ExecutableProbe, InstallationProbe};

use crate::engine::{ChannelClosed, ChannelId};
use crate::error::BridgeResult;
use crate::types::{ServerInfo, ToolDescriptor, ToolResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// The operations a connection manager needs from a hop endpoint
#[async_trait]
pub trait HopClient: Send + Sync + 'static {
    /// Name of the peer, for logs
    fn name(&self) -> String;

    /// Open a fresh channel, replacing any existing one
    async fn open(&self) -> BridgeResult<ChannelId>;

    /// One-round handshake on the open channel
    async fn handshake(&self) -> BridgeResult<ServerInfo>;

    async fn list_tools(&self) -> BridgeResult<Vec<ToolDescriptor>>;

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>)
    -> BridgeResult<ToolResult>;

    /// Graceful close; ends with a teardown
    async fn close(&self) {
        self.teardown();
    }

    /// Immediate teardown. Returns `false` when nothing was attached.
    fn teardown(&self) -> bool;

    fn subscribe_closed(&self) -> broadcast::Receiver<ChannelClosed>;

    fn current_channel(&self) -> Option<ChannelId>;
}
