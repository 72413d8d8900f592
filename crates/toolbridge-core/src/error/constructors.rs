//! Constructor methods for BridgeError

use super::types::BridgeError;
use serde_json::Value;
use std::time::Duration;

impl BridgeError {
    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            context: None,
        }
    }

    /// Create a spawn failure for `program`
    pub fn spawn_failed(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            message: message.into(),
            context: None,
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new protocol ("unexpected response") error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            context: None,
        }
    }

    /// Create a remote error
    pub fn remote(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a remote error carrying the peer's `data` payload
    pub fn remote_with_data(code: Option<i64>, message: impl Into<String>, data: Value) -> Self {
        Self::Remote {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create a not-installed error
    pub fn not_installed(path: impl Into<String>) -> Self {
        Self::NotInstalled { path: path.into() }
    }

    /// Create an invalid-state error
    pub fn invalid_state(state: impl ToString, operation: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.to_string(),
            operation: operation.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout {
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            context: None,
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Add context to any error that carries one
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = Some(context.into());
        match &mut self {
            Self::Transport { context: c, .. } => *c = ctx,
            Self::SpawnFailed { context: c, .. } => *c = ctx,
            Self::Serialization { context: c, .. } => *c = ctx,
            Self::Protocol { context: c, .. } => *c = ctx,
            Self::Timeout { context: c, .. } => *c = ctx,
            Self::Config { context: c, .. } => *c = ctx,
            Self::Disconnected
            | Self::Remote { .. }
            | Self::NotInstalled { .. }
            | Self::NotConnected
            | Self::InvalidState { .. } => {}
        }
        self
    }
}
