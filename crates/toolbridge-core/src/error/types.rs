//! Core error type for toolbridge

use serde_json::Value;
use thiserror::Error;

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Coarse classification used by callers that only care about *who* failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The channel itself failed (spawn, pipe, decode, disconnect)
    Transport,
    /// The peer answered, but not with what the operation expects
    Protocol,
    /// The peer answered with an explicit error
    Remote,
    /// The operation is not allowed in the current state
    State,
    /// Configuration or local policy (timeouts)
    Local,
}

/// Main error type for the bridge
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// Broken pipe, write failure, or any other I/O problem on a channel
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        context: Option<String>,
    },

    /// The child process could not be started
    #[error("Failed to spawn '{program}': {message}")]
    SpawnFailed {
        program: String,
        message: String,
        context: Option<String>,
    },

    /// The channel went away while the call was pending
    #[error("Channel disconnected")]
    Disconnected,

    /// A message could not be encoded or decoded
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        context: Option<String>,
    },

    /// Well-formed reply with an unexpected payload shape
    #[error("Unexpected response: {message}")]
    Protocol {
        message: String,
        context: Option<String>,
    },

    /// Explicit error object returned by the peer
    #[error("{}", format_remote(*code, message))]
    Remote {
        code: Option<i64>,
        message: String,
        data: Option<Value>,
    },

    /// The executable backing this hop is not present
    #[error("Not installed: {path}")]
    NotInstalled { path: String },

    /// No live channel, or the state does not allow calls
    #[error("Not connected")]
    NotConnected,

    /// Operation rejected by the connection state machine
    #[error("Cannot {operation} while {state}")]
    InvalidState { state: String, operation: String },

    /// A caller-imposed deadline expired
    #[error("Request timeout after {millis}ms")]
    Timeout {
        millis: u64,
        context: Option<String>,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },
}

fn format_remote(code: Option<i64>, message: &str) -> String {
    match code {
        Some(code) => format!("Remote error {}: {}", code, message),
        None => format!("Remote error: {}", message),
    }
}

impl BridgeError {
    /// Stable code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "BRIDGE_TRANSPORT",
            Self::SpawnFailed { .. } => "BRIDGE_SPAWN_FAILED",
            Self::Disconnected => "BRIDGE_DISCONNECTED",
            Self::Serialization { .. } => "BRIDGE_SERIALIZATION",
            Self::Protocol { .. } => "BRIDGE_PROTOCOL",
            Self::Remote { .. } => "BRIDGE_REMOTE",
            Self::NotInstalled { .. } => "BRIDGE_NOT_INSTALLED",
            Self::NotConnected => "BRIDGE_NOT_CONNECTED",
            Self::InvalidState { .. } => "BRIDGE_INVALID_STATE",
            Self::Timeout { .. } => "BRIDGE_TIMEOUT",
            Self::Config { .. } => "BRIDGE_CONFIG",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. }
            | Self::SpawnFailed { .. }
            | Self::Disconnected
            | Self::Serialization { .. } => ErrorCategory::Transport,
            Self::Protocol { .. } => ErrorCategory::Protocol,
            Self::Remote { .. } => ErrorCategory::Remote,
            Self::NotInstalled { .. } | Self::NotConnected | Self::InvalidState { .. } => {
                ErrorCategory::State
            }
            Self::Timeout { .. } | Self::Config { .. } => ErrorCategory::Local,
        }
    }

    /// Get optional context about the error
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Transport { context, .. }
            | Self::SpawnFailed { context, .. }
            | Self::Serialization { context, .. }
            | Self::Protocol { context, .. }
            | Self::Timeout { context, .. }
            | Self::Config { context, .. } => context.as_deref(),
            _ => None,
        }
    }

    /// Whether a reconnect-and-retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Disconnected | Self::Timeout { .. }
        )
    }

    /// The remote JSON-RPC code, when the peer supplied one
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::Remote { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err.to_string())
    }
}
