//! Caller side of hop A

use super::protocol::{RelayAction, RelayProtocol, RelayRequest, RelayResponse, ResponseData};
use crate::config::{RelayConfig, SessionTarget};
use crate::engine::{
    ChannelClosed, ChannelId, Connector, NotificationHandler, ProcessConnector, RpcEngine,
    SpawnSpec,
};
use crate::error::{BridgeError, BridgeResult};
use crate::session::HopClient;
use crate::types::{ServerInfo, ToolDescriptor, ToolResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a graceful close waits for the relay to acknowledge
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Logs status lines the relay sends outside any request
struct RelayStatusLogger;

impl NotificationHandler<RelayProtocol> for RelayStatusLogger {
    fn handle(&self, message: &RelayResponse) {
        match message.clone().into_data() {
            Ok(ResponseData::Message { message }) => info!("relay: {}", message),
            Ok(other) => debug!("relay sent uncorrelated {} data", other.kind()),
            Err(e) => warn!("relay: {}", e),
        }
    }
}

/// Client for the relay process
pub struct RelayClient {
    engine: RpcEngine<RelayProtocol>,
    connector: Box<dyn Connector>,
}

impl RelayClient {
    pub fn new(connector: impl Connector + 'static) -> Self {
        let engine = RpcEngine::new();
        engine.set_notification_handler(Arc::new(RelayStatusLogger));
        Self {
            engine,
            connector: Box::new(connector),
        }
    }

    /// Client that spawns the configured relay executable
    pub fn from_config(relay: &RelayConfig, session: Option<&SessionTarget>) -> Self {
        let mut spec = SpawnSpec::new(&relay.executable).with_args(relay.args.iter().cloned());
        for (key, value) in &relay.env {
            spec = spec.with_env(key.clone(), value.clone());
        }
        if let Some(session) = session {
            for (key, value) in session.env_pairs() {
                spec = spec.with_env(key, value);
            }
        }
        Self::new(ProcessConnector::new(spec))
    }

    pub fn engine(&self) -> &RpcEngine<RelayProtocol> {
        &self.engine
    }

    /// Send one action and decode its payload
    async fn request(&self, action: RelayAction) -> BridgeResult<ResponseData> {
        let id = Uuid::new_v4().to_string();
        let kind = action.kind();
        let request = RelayRequest {
            id: id.clone(),
            action,
        };

        debug!("relay request {} ({})", id, kind);
        let response = self.engine.send(id, &request).await?.wait().await?;
        response.into_data()
    }
}

fn unexpected(expected: &str, got: &ResponseData) -> BridgeError {
    BridgeError::protocol(format!(
        "Expected {} data, got {}",
        expected,
        got.kind()
    ))
}

/// Arguments travel as strings on this hop
fn stringify_arguments(arguments: Map<String, Value>) -> BTreeMap<String, String> {
    arguments
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}

#[async_trait]
impl HopClient for RelayClient {
    fn name(&self) -> String {
        self.connector.describe()
    }

    async fn open(&self) -> BridgeResult<ChannelId> {
        let channel = self.connector.connect().await?;
        Ok(self.engine.attach(channel))
    }

    async fn handshake(&self) -> BridgeResult<ServerInfo> {
        match self.request(RelayAction::Connect).await? {
            ResponseData::Connected { server_info } => Ok(server_info),
            other => Err(unexpected("connected", &other)),
        }
    }

    async fn list_tools(&self) -> BridgeResult<Vec<ToolDescriptor>> {
        match self.request(RelayAction::ListTools).await? {
            ResponseData::Tools { tools } => Ok(tools),
            other => Err(unexpected("tools", &other)),
        }
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> BridgeResult<ToolResult> {
        let action = RelayAction::CallTool {
            name: name.to_string(),
            arguments: stringify_arguments(arguments),
        };
        match self.request(action).await? {
            ResponseData::ToolResult { result } => Ok(result),
            other => Err(unexpected("toolResult", &other)),
        }
    }

    /// Ask the relay to drop hop B, then tear hop A down
    async fn close(&self) {
        if self.engine.is_attached() {
            match tokio::time::timeout(DISCONNECT_GRACE, self.request(RelayAction::Disconnect))
                .await
            {
                Ok(Ok(_)) => debug!("relay acknowledged disconnect"),
                Ok(Err(e)) => debug!("relay disconnect failed: {}", e),
                Err(_) => debug!("relay did not acknowledge disconnect in time"),
            }
        }
        self.engine.teardown();
    }

    fn teardown(&self) -> bool {
        self.engine.teardown()
    }

    fn subscribe_closed(&self) -> broadcast::Receiver<ChannelClosed> {
        self.engine.subscribe_closed()
    }

    fn current_channel(&self) -> Option<ChannelId> {
        self.engine.current_channel()
    }
}
