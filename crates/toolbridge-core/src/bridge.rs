//! Ready-made managers for both ends of the chain

use crate::config::BridgeConfig;
use crate::mcp::McpClient;
use crate::relay::{RelayClient, RelayServer};
use crate::session::{CommandProbe, ConnectionManager, ExecutableProbe};
use std::time::Duration;

/// The foreground surface: hop A to the relay process.
///
/// `connect`, `list_tools`, `call_tool` and `disconnect` are the four
/// operations the UI layer consumes.
pub type Bridge = ConnectionManager<RelayClient>;

/// The relay's own view of hop B
pub type HostSession = ConnectionManager<McpClient>;

impl ConnectionManager<RelayClient> {
    /// Spawns the configured relay; installed when its executable exists
    pub fn from_config(config: &BridgeConfig) -> Self {
        let client = RelayClient::from_config(&config.relay, config.session.as_ref());
        ConnectionManager::new(client, ExecutableProbe::new(&config.relay.executable))
            .with_call_timeout(config.call_timeout_secs.map(Duration::from_secs))
    }
}

impl ConnectionManager<McpClient> {
    /// Spawns the configured capability host; installed when its command resolves
    pub fn from_config(config: &BridgeConfig) -> Self {
        let client = McpClient::from_config(&config.host, config.session.as_ref());
        ConnectionManager::new(client, CommandProbe::new(&config.host.command))
            .with_call_timeout(config.call_timeout_secs.map(Duration::from_secs))
    }
}

impl RelayServer<McpClient> {
    pub fn from_config(config: &BridgeConfig) -> Self {
        RelayServer::new(HostSession::from_config(config))
    }
}
