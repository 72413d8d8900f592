//! MCP client implementation
//!
//! Provides a high-level client for the capability host on top of the
//! correlated engine.

use super::protocol::{
    MCP_PROTOCOL_VERSION, McpMessage, McpNotification, McpProtocol, McpRequest, methods,
};
use super::types::{ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, ListToolsResult};
use crate::config::{HostConfig, SessionTarget};
use crate::engine::{ChannelClosed, ChannelId, Connector, ProcessConnector, RpcEngine, SpawnSpec};
use crate::error::{BridgeError, BridgeResult};
use crate::session::HopClient;
use crate::types::{ServerInfo, ToolDescriptor, ToolResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, instrument};

/// MCP client for communicating with a capability host
pub struct McpClient {
    engine: RpcEngine<McpProtocol>,
    connector: Box<dyn Connector>,
    /// Request ID counter
    request_id: AtomicI64,
}

impl McpClient {
    /// Create a new MCP client that opens channels through `connector`
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            engine: RpcEngine::new(),
            connector: Box::new(connector),
            request_id: AtomicI64::new(1),
        }
    }

    /// Client that spawns the host described by `host`, forwarding the
    /// session target through its environment
    pub fn from_config(host: &HostConfig, session: Option<&SessionTarget>) -> Self {
        let mut spec = SpawnSpec::new(&host.command).with_args(host.args.iter().cloned());
        for (key, value) in &host.env {
            spec = spec.with_env(key.clone(), value.clone());
        }
        if let Some(session) = session {
            for (key, value) in session.env_pairs() {
                spec = spec.with_env(key, value);
            }
        }
        Self::new(ProcessConnector::new(spec))
    }

    pub fn engine(&self) -> &RpcEngine<McpProtocol> {
        &self.engine
    }

    /// Attach a fresh channel from the connector
    pub async fn open(&self) -> BridgeResult<ChannelId> {
        let channel = self.connector.connect().await?;
        Ok(self.engine.attach(channel))
    }

    /// Run the initialize handshake
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> BridgeResult<ServerInfo> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo::default(),
        };

        let result: InitializeResult = self
            .call(methods::INITIALIZE, Some(json!(params)))
            .await?;
        if result.protocol_version != MCP_PROTOCOL_VERSION {
            debug!(
                "Host answered with protocol version {}",
                result.protocol_version
            );
        }

        self.notify(methods::INITIALIZED, None).await?;
        Ok(result.into())
    }

    /// List available tools, following pagination cursors
    pub async fn list_tools(&self) -> BridgeResult<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut seen_cursors = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = self.call(methods::TOOLS_LIST, params).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if seen_cursors.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    return Err(BridgeError::protocol(format!(
                        "tools/list returned cursor '{}' twice",
                        next
                    )));
                }
                None => break,
            }
        }

        Ok(tools)
    }

    /// Call a tool
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> BridgeResult<ToolResult> {
        let params = json!({
            "name": name,
            "arguments": arguments
        });
        self.call(methods::TOOLS_CALL, Some(params)).await
    }

    /// Ping the host
    pub async fn ping(&self) -> BridgeResult<()> {
        let _: Value = self.call(methods::PING, None).await?;
        Ok(())
    }

    /// Make a request and wait for response
    async fn call<T>(&self, method: &str, params: Option<Value>) -> BridgeResult<T>
    where
        T: DeserializeOwned,
    {
        let id = self.next_request_id();
        let request = McpRequest::new(id, method);
        let request = match params {
            Some(p) => request.with_params(p),
            None => request,
        };

        let reply = self
            .engine
            .send(id, &McpMessage::Request(request))
            .await?
            .wait()
            .await?;

        let McpMessage::Response(response) = reply else {
            return Err(BridgeError::protocol(format!(
                "Expected a response to {} request {}",
                method, id
            )));
        };
        let value = response.into_result()?;
        serde_json::from_value(value).map_err(|e| {
            BridgeError::protocol(format!("Invalid {} result: {}", method, e))
                .with_context(format!("Decoding response to request {}", id))
        })
    }

    /// Send a notification (no response expected)
    async fn notify(&self, method: &str, params: Option<Value>) -> BridgeResult<()> {
        let notification = McpNotification::new(method);
        let notification = match params {
            Some(p) => notification.with_params(p),
            None => notification,
        };
        self.engine
            .notify(&McpMessage::Notification(notification))
            .await
    }

    fn next_request_id(&self) -> i64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl HopClient for McpClient {
    fn name(&self) -> String {
        self.connector.describe()
    }

    async fn open(&self) -> BridgeResult<ChannelId> {
        McpClient::open(self).await
    }

    async fn handshake(&self) -> BridgeResult<ServerInfo> {
        self.initialize().await
    }

    async fn list_tools(&self) -> BridgeResult<Vec<ToolDescriptor>> {
        McpClient::list_tools(self).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> BridgeResult<ToolResult> {
        McpClient::call_tool(self, name, arguments).await
    }

    async fn close(&self) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FnConnector;
    use crate::test_support::FakeHost;

    fn client_for(host: FakeHost) -> McpClient {
        McpClient::new(FnConnector::new("fake-host", move || Ok(host.open())))
    }

    #[tokio::test]
    async fn test_initialize_then_initialized_notification() {
        let host = FakeHost::new();
        let client = client_for(host.clone());
        client.open().await.unwrap();

        let info = client.initialize().await.unwrap();
        assert_eq!(info.name, "fake-host");
        assert_eq!(info.protocol_version.as_deref(), Some(MCP_PROTOCOL_VERSION));

        client.ping().await.unwrap();
        let methods = host.methods();
        assert_eq!(&methods[..2], &["initialize", "notifications/initialized"]);
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursor() {
        let client = client_for(FakeHost::new().with_page_size(1));
        client.open().await.unwrap();
        client.initialize().await.unwrap();

        let tools = client.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, FakeHost::TOOL_NAMES);
    }

    #[tokio::test]
    async fn test_call_tool_result_and_tool_error() {
        let client = client_for(FakeHost::new());
        client.open().await.unwrap();

        let mut args = Map::new();
        args.insert("text".to_string(), json!("hello"));
        let result = client.call_tool("echo", args).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text_content(), "hello");

        let failed = client.call_tool("fail", Map::new()).await.unwrap();
        assert!(failed.is_error);
    }

    #[tokio::test]
    async fn test_remote_error_carries_code() {
        let client = client_for(FakeHost::new());
        client.open().await.unwrap();

        let err = client.call::<Value>("resources/list", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::Remote { .. }));
        assert_eq!(err.remote_code(), Some(-32601));
        assert!(err.to_string().contains("Method not found"));
    }

    #[tokio::test]
    async fn test_unexpected_result_shape_is_protocol_error() {
        let client = client_for(FakeHost::new());
        client.open().await.unwrap();

        // ping answers `{}`, which has no `tools` field
        let err = client
            .call::<ListToolsResult>(methods::PING, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_request_ids_are_sequential() {
        let host = FakeHost::new();
        let client = client_for(host.clone());
        client.open().await.unwrap();

        client.ping().await.unwrap();
        client.ping().await.unwrap();
        client.ping().await.unwrap();
        assert_eq!(host.request_ids(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_call_without_channel_is_not_connected() {
        let client = client_for(FakeHost::new());
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected));
    }

    #[tokio::test]
    async fn test_host_crash_fails_call_with_disconnect() {
        let client = client_for(FakeHost::new());
        client.open().await.unwrap();

        let err = client.call_tool("crash", Map::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Disconnected));
        assert!(HopClient::current_channel(&client).is_none());
    }

    #[test]
    fn test_from_config_forwards_session() {
        let host = HostConfig::new("demo-mcp").with_env("A", "1");
        let session = SessionTarget::new("s-9").with_pid(31);
        let client = McpClient::from_config(&host, Some(&session));
        assert_eq!(client.name(), "demo-mcp");
    }
}
