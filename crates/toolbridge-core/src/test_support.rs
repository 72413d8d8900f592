//! Scripted in-process capability host used by unit tests

use crate::engine::{Channel, FnConnector};
use crate::error::BridgeResult;
use crate::framing::FrameReader;
use crate::mcp::{McpResponse, McpRpcError};
use crate::types::ToolDescriptor;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

/// A JSON-RPC host that answers over a duplex pipe.
///
/// Tools: `echo` returns its `text` argument, `fail` reports a tool error,
/// `slow` answers after `ms` milliseconds. Calling the unlisted `crash` tool
/// closes the pipe without replying.
#[derive(Clone)]
pub(crate) struct FakeHost {
    page_size: usize,
    log: Arc<Mutex<Vec<Value>>>,
}

impl FakeHost {
    pub const TOOL_NAMES: [&'static str; 3] = ["echo", "fail", "slow"];

    pub fn new() -> Self {
        Self {
            page_size: Self::TOOL_NAMES.len(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Open a new connection to this host
    pub fn open(&self) -> Channel {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(local);
        tokio::spawn(self.clone().serve(remote));
        Channel::from_io(reader, writer)
    }

    /// Methods received so far, notifications included
    pub fn methods(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|m| m.get("method").and_then(Value::as_str).map(String::from))
            .collect()
    }

    pub fn request_ids(&self) -> Vec<i64> {
        self.log
            .lock()
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_i64))
            .collect()
    }

    async fn serve(self, stream: DuplexStream) {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut frames = FrameReader::new(reader);
        let (tx, mut rx) = mpsc::unbounded_channel::<McpResponse>();

        let write_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let mut bytes = serde_json::to_vec(&message).unwrap();
                bytes.push(b'\n');
                if writer.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        while let Ok(Some(line)) = frames.next_frame().await {
            let message: Value = match serde_json::from_slice(&line) {
                Ok(message) => message,
                Err(_) => {
                    let _ = tx.send(McpResponse::error(None, McpRpcError::parse_error()));
                    continue;
                }
            };
            self.log.lock().push(message.clone());

            let Some(id) = message.get("id") else {
                continue;
            };
            let (Some(id), Some(method)) = (id.as_i64(), message["method"].as_str()) else {
                let _ = tx.send(McpResponse::error(None, McpRpcError::invalid_request()));
                continue;
            };
            let method = method.to_string();
            let params = message.get("params").cloned().unwrap_or(Value::Null);
            if method == "tools/call" && params["name"] == "crash" {
                break;
            }

            let host = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = match host.respond(&method, &params).await {
                    Ok(result) => McpResponse::success(id, result),
                    Err(error) => McpResponse::error(Some(id), error),
                };
                let _ = tx.send(reply);
            });
        }

        write_task.abort();
    }

    async fn respond(&self, method: &str, params: &Value) -> Result<Value, McpRpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake-host", "version": "1.0.0"}
            })),
            "ping" => Ok(json!({})),
            "tools/list" => {
                let start = params
                    .get("cursor")
                    .and_then(Value::as_str)
                    .and_then(|c| c.parse::<usize>().ok())
                    .unwrap_or(0);
                let end = (start + self.page_size).min(Self::TOOL_NAMES.len());
                let tools: Vec<ToolDescriptor> = Self::TOOL_NAMES[start..end]
                    .iter()
                    .map(|name| {
                        ToolDescriptor::new(*name)
                            .with_description(format!("The {} tool", name))
                            .with_input_schema(json!({"type": "object"}))
                    })
                    .collect();
                let mut page = json!({ "tools": tools });
                if end < Self::TOOL_NAMES.len() {
                    page["nextCursor"] = json!(end.to_string());
                }
                Ok(page)
            }
            "tools/call" => {
                let args = &params["arguments"];
                match params["name"].as_str() {
                    Some("echo") => {
                        let text = match &args["text"] {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        Ok(json!({"content": [{"type": "text", "text": text}]}))
                    }
                    Some("fail") => Ok(json!({
                        "content": [{"type": "text", "text": "tool failed"}],
                        "isError": true
                    })),
                    Some("slow") => {
                        let ms = match &args["ms"] {
                            Value::String(s) => s.parse().unwrap_or(50),
                            other => other.as_u64().unwrap_or(50),
                        };
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        Ok(json!({"content": [{"type": "text", "text": "slow done"}]}))
                    }
                    other => Err(McpRpcError {
                        message: format!("Unknown tool: {}", other.unwrap_or_default()),
                        ..McpRpcError::invalid_params()
                    }),
                }
            }
            _ => Err(McpRpcError::method_not_found()),
        }
    }
}

/// Connector to a peer that keeps its pipe open and never answers
pub(crate) fn silent_connector() -> FnConnector<impl Fn() -> BridgeResult<Channel> + Send + Sync> {
    let held = Arc::new(Mutex::new(Vec::new()));
    FnConnector::new("silent-host", move || {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        held.lock().push(remote);
        let (reader, writer) = tokio::io::split(local);
        Ok(Channel::from_io(reader, writer))
    })
}
