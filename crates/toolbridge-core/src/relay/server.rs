//! The relay process: serves hop A on stdio and drives hop B
//!
//! Each request runs on its own task, so a slow tool call never holds up a
//! `listTools`. Responses are funnelled through one writer task and always
//! leave as whole lines.

use super::protocol::{RelayAction, RelayRequest, RelayResponse, ResponseData};
use crate::error::{BridgeError, BridgeResult};
use crate::framing::{FrameReader, encode_line};
use crate::session::{ConnectionManager, HopClient};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub struct RelayServer<C: HopClient> {
    manager: Arc<ConnectionManager<C>>,
}

impl<C: HopClient> RelayServer<C> {
    pub fn new(manager: ConnectionManager<C>) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }

    /// Hop B as seen from the relay
    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    /// Serve requests from `input` until it closes, then disconnect hop B
    pub async fn serve<R, W>(&self, input: R, output: W) -> BridgeResult<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_responses(output, rx));
        let _ = tx.send(RelayResponse::info(format!(
            "toolbridge relay {} ready",
            env!("CARGO_PKG_VERSION")
        )));

        let mut frames = FrameReader::new(input);
        let mut handlers = JoinSet::new();

        loop {
            let line = match frames.next_frame().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("Caller closed the relay input");
                    break;
                }
                Err(e) => {
                    warn!("Reading relay input failed: {}", e);
                    break;
                }
            };

            match parse_request(&line) {
                Ok(request) => {
                    let manager = Arc::clone(&self.manager);
                    let tx = tx.clone();
                    handlers.spawn(async move {
                        let response = handle(&manager, request).await;
                        let _ = tx.send(response);
                    });
                }
                Err(response) => {
                    let _ = tx.send(response);
                }
            }
            // Reap finished handlers
            while handlers.try_join_next().is_some() {}
        }

        let result = self.manager.disconnect().await;
        while handlers.join_next().await.is_some() {}
        drop(tx);
        if let Err(e) = writer.await {
            warn!("Relay writer task failed: {}", e);
        }
        info!("Relay stopped");
        result
    }
}

/// Decode one request line. Lines that cannot be answered by id produce an
/// `info` line instead.
fn parse_request(line: &[u8]) -> Result<RelayRequest, RelayResponse> {
    let value: Value = serde_json::from_slice(line)
        .map_err(|e| RelayResponse::info(format!("Ignoring malformed request: {}", e)))?;

    let Some(id) = value.get("id").and_then(Value::as_str).map(String::from) else {
        return Err(RelayResponse::info("Ignoring request without a string id"));
    };

    let action = value.get("action").cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<RelayAction>(action) {
        Ok(action) => Ok(RelayRequest { id, action }),
        Err(e) => Err(RelayResponse::error(
            Some(id),
            &BridgeError::protocol(format!("Invalid action: {}", e)),
        )),
    }
}

async fn handle<C: HopClient>(manager: &ConnectionManager<C>, request: RelayRequest) -> RelayResponse {
    let RelayRequest { id, action } = request;
    debug!("Handling {} ({})", id, action.kind());

    let result = match action {
        RelayAction::Connect => manager
            .connect()
            .await
            .map(|server_info| ResponseData::Connected { server_info }),
        RelayAction::ListTools => manager
            .list_tools()
            .await
            .map(|tools| ResponseData::Tools { tools }),
        RelayAction::CallTool { name, arguments } => {
            let arguments: Map<String, Value> = arguments
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();
            manager
                .call_tool(&name, arguments)
                .await
                .map(|result| ResponseData::ToolResult { result })
        }
        RelayAction::Disconnect => manager
            .disconnect()
            .await
            .map(|_| ResponseData::Disconnected),
    };

    match result {
        Ok(data) => RelayResponse::ok(id, data),
        Err(e) => {
            debug!("Request {} failed: {}", id, e);
            RelayResponse::error(Some(id), &e)
        }
    }
}

async fn write_responses<W>(mut output: W, mut rx: mpsc::UnboundedReceiver<RelayResponse>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let bytes = match encode_line(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Dropping unencodable response: {}", e);
                continue;
            }
        };
        if let Err(e) = output.write_all(&bytes).await {
            warn!("Writing relay output failed: {}", e);
            break;
        }
        if let Err(e) = output.flush().await {
            warn!("Flushing relay output failed: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FnConnector;
    use crate::mcp::McpClient;
    use crate::state::ConnectionState;
    use crate::test_support::{FakeHost, silent_connector};
    use std::time::Duration;
    use serde_json::json;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    struct Caller {
        frames: FrameReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Caller {
        async fn send(&mut self, value: Value) {
            self.send_raw(&serde_json::to_vec(&value).unwrap()).await;
        }

        async fn send_raw(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = self.frames.next_frame().await.unwrap().expect("relay closed");
            serde_json::from_slice(&line).unwrap()
        }
    }

    type Started = (
        Arc<RelayServer<McpClient>>,
        Caller,
        tokio::task::JoinHandle<BridgeResult<()>>,
    );

    fn start(host: FakeHost) -> Started {
        start_with(McpClient::new(FnConnector::new("fake-host", move || Ok(host.open()))))
    }

    fn start_with(client: McpClient) -> Started {
        let server = Arc::new(RelayServer::new(ConnectionManager::new(client, || true)));

        let (relay_side, caller_side) = tokio::io::duplex(64 * 1024);
        let (relay_r, relay_w) = tokio::io::split(relay_side);
        let (caller_r, caller_w) = tokio::io::split(caller_side);

        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.serve(relay_r, relay_w).await });
        let caller = Caller {
            frames: FrameReader::new(caller_r),
            writer: caller_w,
        };
        (server, caller, task)
    }

    #[tokio::test]
    async fn test_ready_line_then_full_session() {
        let (server, mut caller, task) = start(FakeHost::new());

        let ready = caller.recv().await;
        assert_eq!(ready["status"], "info");
        assert_eq!(ready["id"], Value::Null);
        assert_eq!(ready["data"]["type"], "message");

        caller.send(json!({"id": "c1", "action": {"type": "connect"}})).await;
        let connected = caller.recv().await;
        assert_eq!(connected["id"], "c1");
        assert_eq!(connected["data"]["serverInfo"]["name"], "fake-host");
        assert_eq!(server.manager().state(), ConnectionState::Connected);

        caller.send(json!({"id": "c2", "action": {"type": "listTools"}})).await;
        let tools = caller.recv().await;
        assert_eq!(tools["data"]["type"], "tools");
        assert_eq!(tools["data"]["tools"].as_array().unwrap().len(), 3);

        caller
            .send(json!({"id": "c3", "action": {"type": "callTool", "name": "echo", "arguments": {"text": "ping"}}}))
            .await;
        let result = caller.recv().await;
        assert_eq!(result["data"]["type"], "toolResult");
        assert_eq!(result["data"]["result"]["content"][0]["text"], "ping");

        caller.send(json!({"id": "c4", "action": {"type": "disconnect"}})).await;
        assert_eq!(caller.recv().await["data"]["type"], "disconnected");
        assert_eq!(server.manager().state(), ConnectionState::Installed);

        drop(caller);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_call_before_connect_is_error_response() {
        let (_server, mut caller, _task) = start(FakeHost::new());
        let _ready = caller.recv().await;

        caller
            .send(json!({"id": "e1", "action": {"type": "callTool", "name": "echo"}}))
            .await;
        let response = caller.recv().await;
        assert_eq!(response["id"], "e1");
        assert_eq!(response["status"], "error");
        assert_eq!(response["error"], "Not connected");
    }

    #[tokio::test]
    async fn test_malformed_lines() {
        let (_server, mut caller, _task) = start(FakeHost::new());
        let _ready = caller.recv().await;

        caller.send_raw(b"{not json").await;
        let info = caller.recv().await;
        assert_eq!(info["status"], "info");
        assert_eq!(info["id"], Value::Null);

        caller.send(json!({"action": {"type": "connect"}})).await;
        assert_eq!(caller.recv().await["status"], "info");

        caller.send(json!({"id": "m3", "action": {"type": "selfDestruct"}})).await;
        let rejected = caller.recv().await;
        assert_eq!(rejected["id"], "m3");
        assert_eq!(rejected["status"], "error");
    }

    #[tokio::test]
    async fn test_host_error_code_forwarded() {
        let (_server, mut caller, _task) = start(FakeHost::new());
        let _ready = caller.recv().await;

        caller.send(json!({"id": "h1", "action": {"type": "connect"}})).await;
        let _ = caller.recv().await;
        caller
            .send(json!({"id": "h2", "action": {"type": "callTool", "name": "missing"}}))
            .await;

        let response = caller.recv().await;
        assert_eq!(response["status"], "error");
        assert_eq!(response["errorCode"], -32602);
        assert_eq!(response["error"], "Unknown tool: missing");
    }

    #[tokio::test]
    async fn test_slow_call_does_not_block_other_requests() {
        let (_server, mut caller, _task) = start(FakeHost::new());
        let _ready = caller.recv().await;

        caller.send(json!({"id": "s1", "action": {"type": "connect"}})).await;
        let _ = caller.recv().await;

        caller
            .send(json!({"id": "slow", "action": {"type": "callTool", "name": "slow", "arguments": {"ms": "300"}}}))
            .await;
        caller.send(json!({"id": "fast", "action": {"type": "listTools"}})).await;

        assert_eq!(caller.recv().await["id"], "fast");
        assert_eq!(caller.recv().await["id"], "slow");
    }

    async fn wait_until_connecting(server: &RelayServer<McpClient>) {
        let mut state = server.manager().subscribe_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == ConnectionState::Connecting),
        )
        .await
        .expect("host connect never started")
        .unwrap();
    }

    #[tokio::test]
    async fn test_input_eof_while_host_handshake_stalls() {
        let (server, mut caller, task) = start_with(McpClient::new(silent_connector()));
        let _ready = caller.recv().await;

        caller.send(json!({"id": "c1", "action": {"type": "connect"}})).await;
        wait_until_connecting(&server).await;
        drop(caller);

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("relay kept running after its input closed");
        result.unwrap().unwrap();
        assert_eq!(server.manager().state(), ConnectionState::Installed);
        assert!(!server.manager().client().engine().is_attached());
    }

    #[tokio::test]
    async fn test_disconnect_action_interrupts_stalled_connect() {
        let (server, mut caller, _task) = start_with(McpClient::new(silent_connector()));
        let _ready = caller.recv().await;

        caller.send(json!({"id": "c1", "action": {"type": "connect"}})).await;
        wait_until_connecting(&server).await;
        caller.send(json!({"id": "d1", "action": {"type": "disconnect"}})).await;

        let mut responses = Vec::new();
        for _ in 0..2 {
            let response = tokio::time::timeout(Duration::from_secs(2), caller.recv())
                .await
                .expect("relay did not answer");
            responses.push(response);
        }
        let by_id = |id: &str| {
            responses
                .iter()
                .find(|r| r["id"] == id)
                .cloned()
                .unwrap_or_else(|| panic!("no response for {}", id))
        };

        assert_eq!(by_id("d1")["data"]["type"], "disconnected");
        assert_eq!(by_id("c1")["status"], "error");
        assert_eq!(server.manager().state(), ConnectionState::Installed);
    }

    #[tokio::test]
    async fn test_input_eof_disconnects_host() {
        let (server, mut caller, task) = start(FakeHost::new());
        let _ready = caller.recv().await;

        caller.send(json!({"id": "x1", "action": {"type": "connect"}})).await;
        let _ = caller.recv().await;
        assert!(server.manager().client().engine().is_attached());

        drop(caller);
        task.await.unwrap().unwrap();
        assert_eq!(server.manager().state(), ConnectionState::Installed);
        assert!(!server.manager().client().engine().is_attached());
    }
}
