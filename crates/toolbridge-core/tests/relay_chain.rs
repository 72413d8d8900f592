//! End-to-end tests of the two-hop chain, all in-process:
//! Bridge -> RelayServer -> McpClient -> scripted host

use serde_json::{Map, Value, json};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use toolbridge_core::engine::{Channel, FnConnector};
use toolbridge_core::framing::FrameReader;
use toolbridge_core::mcp::McpClient;
use toolbridge_core::relay::{RelayClient, RelayServer};
use toolbridge_core::{Bridge, BridgeError, ConnectionManager, ConnectionState};

/// Sequential JSON-RPC host: `echo` returns `text`, `fail` is a tool error,
/// anything else is an unknown tool
fn scripted_host() -> Channel {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(local);

    tokio::spawn(async move {
        let (remote_r, mut remote_w) = tokio::io::split(remote);
        let mut frames = FrameReader::new(remote_r);
        while let Ok(Some(line)) = frames.next_frame().await {
            let request: Value = serde_json::from_slice(&line).unwrap();
            let Some(id) = request.get("id").cloned() else {
                continue;
            };
            let body = match request["method"].as_str().unwrap_or_default() {
                "initialize" => json!({"result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "scripted-host", "version": "0.9.0"}
                }}),
                "tools/list" => json!({"result": {"tools": [
                    {"name": "echo", "inputSchema": {"type": "object"}},
                    {"name": "fail", "inputSchema": {"type": "object"}}
                ]}}),
                "tools/call" => match request["params"]["name"].as_str() {
                    Some("echo") => json!({"result": {"content": [
                        {"type": "text", "text": request["params"]["arguments"]["text"]}
                    ]}}),
                    Some("fail") => json!({"result": {
                        "content": [{"type": "text", "text": "nope"}],
                        "isError": true
                    }}),
                    _ => json!({"error": {"code": -32602, "message": "Unknown tool"}}),
                },
                _ => json!({"error": {"code": -32601, "message": "Method not found"}}),
            };

            let mut reply = body;
            reply["jsonrpc"] = json!("2.0");
            reply["id"] = id;
            let mut bytes = serde_json::to_vec(&reply).unwrap();
            bytes.push(b'\n');
            if remote_w.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    Channel::from_io(reader, writer)
}

/// A relay process stand-in: a RelayServer on the far end of a pipe
fn relay_channel() -> Channel {
    let host = McpClient::new(FnConnector::new("scripted-host", || Ok(scripted_host())));
    let server = RelayServer::new(ConnectionManager::new(host, || true));

    let (caller_side, relay_side) = tokio::io::duplex(64 * 1024);
    let (relay_r, relay_w) = tokio::io::split(relay_side);
    tokio::spawn(async move { server.serve(relay_r, relay_w).await });

    let (reader, writer) = tokio::io::split(caller_side);
    Channel::from_io(reader, writer)
}

fn bridge() -> Bridge {
    let relay = RelayClient::new(FnConnector::new("in-process-relay", || Ok(relay_channel())));
    ConnectionManager::new(relay, || true)
}

fn text_args(text: &str) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert("text".to_string(), json!(text));
    args
}

#[tokio::test]
async fn test_connect_list_call_disconnect_through_both_hops() {
    let bridge = bridge();
    assert_eq!(bridge.state(), ConnectionState::Installed);

    let info = bridge.connect().await.unwrap();
    assert_eq!(info.name, "scripted-host");
    assert_eq!(info.version, "0.9.0");
    assert_eq!(bridge.state(), ConnectionState::Connected);

    let tools = bridge.list_tools().await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "fail"]);

    let result = bridge.call_tool("echo", text_args("over the relay")).await.unwrap();
    assert!(!result.is_error);
    assert_eq!(result.text_content(), "over the relay");

    bridge.disconnect().await.unwrap();
    assert_eq!(bridge.state(), ConnectionState::Installed);
    bridge.disconnect().await.unwrap();
    assert_eq!(bridge.state(), ConnectionState::Installed);
}

#[tokio::test]
async fn test_non_string_arguments_arrive_as_strings() {
    let bridge = bridge();
    bridge.connect().await.unwrap();

    let mut args = Map::new();
    args.insert("text".to_string(), json!(42));
    let result = bridge.call_tool("echo", args).await.unwrap();
    assert_eq!(result.text_content(), "42");
}

#[tokio::test]
async fn test_tool_error_is_a_result_not_a_failure() {
    let bridge = bridge();
    bridge.connect().await.unwrap();

    let result = bridge.call_tool("fail", Map::new()).await.unwrap();
    assert!(result.is_error);
    assert_eq!(result.text_content(), "nope");
    assert_eq!(bridge.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_host_error_code_survives_both_hops() {
    let bridge = bridge();
    bridge.connect().await.unwrap();

    let err = bridge.call_tool("missing", Map::new()).await.unwrap_err();
    assert!(matches!(err, BridgeError::Remote { .. }));
    assert_eq!(err.remote_code(), Some(-32602));
    assert!(err.to_string().contains("Unknown tool"));
}

#[tokio::test]
async fn test_invoke_before_connect_is_not_connected() {
    let bridge = bridge();
    let err = bridge.call_tool("echo", text_args("early")).await.unwrap_err();
    assert!(matches!(err, BridgeError::NotConnected));
    assert_eq!(bridge.state(), ConnectionState::Installed);
}

#[tokio::test]
async fn test_concurrent_calls_are_matched_end_to_end() {
    let bridge = bridge();
    bridge.connect().await.unwrap();

    let calls = (0..16).map(|i| {
        let bridge = &bridge;
        async move {
            let text = format!("call-{}", i);
            let result = bridge.call_tool("echo", text_args(&text)).await.unwrap();
            (text, result.text_content())
        }
    });
    for (sent, received) in futures::future::join_all(calls).await {
        assert_eq!(sent, received);
    }
    assert_eq!(bridge.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_reconnect_replaces_relay_channel() {
    let bridge = bridge();
    bridge.connect().await.unwrap();
    let first = bridge.client().engine().current_channel().unwrap();

    bridge.connect().await.unwrap();
    let second = bridge.client().engine().current_channel().unwrap();
    assert_ne!(first, second);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bridge.state(), ConnectionState::Connected);
    assert_eq!(bridge.list_tools().await.unwrap().len(), 2);
}
