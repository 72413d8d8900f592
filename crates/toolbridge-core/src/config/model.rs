//! Configuration model

use super::logging_config::LoggingConfig;
use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment value naming the foreground session a host should target
pub const SESSION_ID_ENV: &str = "TOOLBRIDGE_SESSION_ID";
/// Environment value carrying the foreground session's process id
pub const SESSION_PID_ENV: &str = "TOOLBRIDGE_SESSION_PID";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Hop A: the relay process
    pub relay: RelayConfig,
    /// Hop B: the capability host
    pub host: HostConfig,
    /// Foreground session the host should attach to
    pub session: Option<SessionTarget>,
    /// Bound on a single tool call; unbounded when unset
    pub call_timeout_secs: Option<u64>,
    pub logging: LoggingConfig,
}

/// How to start the relay process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Installed relay executable; its presence is the installation check
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let executable = dirs::home_dir()
            .map(|home| home.join(".toolbridge").join("bin").join("toolbridge"))
            .unwrap_or_else(|| PathBuf::from("toolbridge"));
        Self {
            executable,
            args: vec!["relay".to_string()],
            env: HashMap::new(),
        }
    }
}

/// How the relay starts the capability host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Command to execute; a bare name is looked up on `PATH`
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            command: "mcp-server".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }
}

impl HostConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Identifies the foreground session a capability host should act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTarget {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl SessionTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pid: None,
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Environment pairs forwarded to spawned processes
    pub fn env_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![(SESSION_ID_ENV, self.id.clone())];
        if let Some(pid) = self.pid {
            pairs.push((SESSION_PID_ENV, pid.to_string()));
        }
        pairs
    }
}

impl BridgeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> BridgeResult<()> {
        if self.host.command.trim().is_empty() {
            return Err(BridgeError::config_with_context(
                "Host command must not be empty",
                "Validating host configuration",
            ));
        }
        if self.relay.executable.as_os_str().is_empty() {
            return Err(BridgeError::config_with_context(
                "Relay executable must not be empty",
                "Validating relay configuration",
            ));
        }
        if self.call_timeout_secs == Some(0) {
            return Err(BridgeError::config(
                "call_timeout_secs must be greater than zero; omit it to disable the timeout",
            ));
        }
        if let Some(session) = &self.session {
            if session.id.trim().is_empty() {
                return Err(BridgeError::config("Session id must not be empty"));
            }
        }
        Ok(())
    }
}
