//! Configuration management for the bridge
//!
//! Sources are applied in order: defaults, config file, `TOOLBRIDGE_*`
//! environment variables. The result is validated before use.

mod env_loader;
mod file_loader;
mod logging_config;
mod model;

pub use env_loader::{ENV_PREFIX, apply_env_overrides, apply_env_overrides_from};
pub use file_loader::load_from_file;
pub use logging_config::LoggingConfig;
pub use model::{
    BridgeConfig, HostConfig, RelayConfig, SESSION_ID_ENV, SESSION_PID_ENV, SessionTarget,
};

use crate::error::BridgeResult;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "toolbridge.json";

/// Load configuration with default sources
///
/// Loads configuration in this order:
/// 1. Default configuration
/// 2. `config_file`, or `toolbridge.json` in the working directory, or
///    `<config dir>/toolbridge/config.json`
/// 3. Environment variables
pub fn load_config(config_file: Option<&Path>) -> BridgeResult<BridgeConfig> {
    let path = match config_file {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path(),
    };

    let mut config = match &path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            load_from_file(path)?
        }
        None => BridgeConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("toolbridge").join("config.json"))
        .filter(|path| path.exists())
}
