//! Environment variable overrides
//!
//! Recognised variables:
//! - `TOOLBRIDGE_RELAY_PATH`: relay executable
//! - `TOOLBRIDGE_HOST_COMMAND`: capability host command
//! - `TOOLBRIDGE_CALL_TIMEOUT_SECS`: per-call timeout
//! - `TOOLBRIDGE_LOG_LEVEL`, `TOOLBRIDGE_LOG_FORMAT`
//! - `TOOLBRIDGE_SESSION_ID`, `TOOLBRIDGE_SESSION_PID`: session target

use super::model::{BridgeConfig, SESSION_ID_ENV, SESSION_PID_ENV, SessionTarget};
use crate::error::{BridgeError, BridgeResult};
use std::env;
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "TOOLBRIDGE_";

/// Apply overrides from the process environment
pub fn apply_env_overrides(config: &mut BridgeConfig) -> BridgeResult<()> {
    apply_env_overrides_from(config, |key| env::var(key).ok())
}

/// Apply overrides using `lookup` to resolve variable names
pub fn apply_env_overrides_from<F>(config: &mut BridgeConfig, lookup: F) -> BridgeResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| {
        lookup(&format!("{}{}", ENV_PREFIX, suffix)).filter(|value| !value.is_empty())
    };

    if let Some(path) = var("RELAY_PATH") {
        config.relay.executable = PathBuf::from(path);
    }

    if let Some(command) = var("HOST_COMMAND") {
        config.host.command = command;
    }

    if let Some(timeout) = var("CALL_TIMEOUT_SECS") {
        let secs: u64 = timeout.parse().map_err(|_| {
            BridgeError::config_with_context(
                format!("Invalid {}CALL_TIMEOUT_SECS value", ENV_PREFIX),
                format!("Parsing timeout value '{}'", timeout),
            )
        })?;
        config.call_timeout_secs = Some(secs);
    }

    if let Some(level) = var("LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = var("LOG_FORMAT") {
        config.logging.format = format;
    }

    if let Some(id) = lookup(SESSION_ID_ENV).filter(|value| !value.is_empty()) {
        let mut session = SessionTarget::new(id);
        if let Some(pid) = lookup(SESSION_PID_ENV) {
            let pid = pid.parse().map_err(|_| {
                BridgeError::config_with_context(
                    format!("Invalid {} value", SESSION_PID_ENV),
                    format!("Parsing process id '{}'", pid),
                )
            })?;
            session = session.with_pid(pid);
        }
        config.session = Some(session);
    }

    Ok(())
}
