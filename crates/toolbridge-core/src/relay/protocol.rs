//! Relay wire schema

use crate::engine::LineProtocol;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{ServerInfo, ToolDescriptor, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// A caller request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub id: String,
    pub action: RelayAction,
}

/// What the caller asks the relay to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayAction {
    Connect,
    ListTools,
    CallTool {
        name: String,
        #[serde(default)]
        arguments: BTreeMap<String, String>,
    },
    Disconnect,
}

impl RelayAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::ListTools => "listTools",
            Self::CallTool { .. } => "callTool",
            Self::Disconnect => "disconnect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
    /// Uncorrelated status line from the relay
    Info,
}

/// A relay response. `data` stays raw until the caller knows which kind
/// it expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// JSON-RPC code from the capability host, when the failure came from it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
}

/// Payload of an `ok` or `info` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResponseData {
    Connected {
        #[serde(rename = "serverInfo")]
        server_info: ServerInfo,
    },
    Tools {
        tools: Vec<ToolDescriptor>,
    },
    ToolResult {
        result: ToolResult,
    },
    Disconnected,
    Message {
        message: String,
    },
}

impl ResponseData {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Tools { .. } => "tools",
            Self::ToolResult { .. } => "toolResult",
            Self::Disconnected => "disconnected",
            Self::Message { .. } => "message",
        }
    }
}

fn encode_data(data: &impl Serialize) -> BridgeResult<Value> {
    serde_json::to_value(data)
        .map_err(|e| BridgeError::serialization(format!("Encoding response data: {}", e)))
}

impl RelayResponse {
    pub fn ok(id: impl Into<String>, data: ResponseData) -> Self {
        Self::from_encoded(id.into(), data.kind(), encode_data(&data))
    }

    /// An `ok` line, or an `error` line carrying the encode failure
    fn from_encoded(id: String, kind: &str, encoded: BridgeResult<Value>) -> Self {
        match encoded {
            Ok(data) => Self {
                id: Some(id),
                status: ResponseStatus::Ok,
                data: Some(data),
                error: None,
                error_code: None,
            },
            Err(e) => {
                warn!("Cannot send {} data for {}: {}", kind, id, e);
                Self::error(Some(id), &e)
            }
        }
    }

    pub fn error(id: Option<String>, err: &BridgeError) -> Self {
        // Host errors are forwarded bare; the code travels in `errorCode`
        let message = match err {
            BridgeError::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            id,
            status: ResponseStatus::Error,
            data: None,
            error: Some(message),
            error_code: err.remote_code(),
        }
    }

    /// Uncorrelated message line
    pub fn info(message: impl Into<String>) -> Self {
        let data = ResponseData::Message {
            message: message.into(),
        };
        match encode_data(&data) {
            Ok(data) => Self {
                id: None,
                status: ResponseStatus::Info,
                data: Some(data),
                error: None,
                error_code: None,
            },
            Err(e) => {
                warn!("Cannot send info line: {}", e);
                Self::error(None, &e)
            }
        }
    }

    /// Decode the payload, turning `error` responses into remote errors
    pub fn into_data(self) -> BridgeResult<ResponseData> {
        if self.status == ResponseStatus::Error {
            let message = self
                .error
                .unwrap_or_else(|| "Relay reported an error without a message".to_string());
            return Err(BridgeError::remote(self.error_code, message));
        }

        let data = self
            .data
            .ok_or_else(|| BridgeError::protocol("Response carries no data"))?;
        serde_json::from_value(data)
            .map_err(|e| BridgeError::protocol(format!("Unrecognised response data: {}", e)))
    }
}

/// Hop A line protocol: string ids, `info` lines are uncorrelated
pub struct RelayProtocol;

impl LineProtocol for RelayProtocol {
    const NAME: &'static str = "relay";
    type Id = String;
    type Outbound = RelayRequest;
    type Inbound = RelayResponse;

    fn inbound_id(message: &RelayResponse) -> Option<String> {
        match message.status {
            ResponseStatus::Info => None,
            ResponseStatus::Ok | ResponseStatus::Error => message.id.clone(),
        }
    }
}
