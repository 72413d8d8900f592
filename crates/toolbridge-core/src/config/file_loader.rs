//! File-based configuration loading

use super::model::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use std::fs;
use std::path::Path;

/// Load configuration from a file
///
/// Supports JSON and TOML formats based on file extension.
/// Returns default config if file doesn't exist.
pub fn load_from_file(path: &Path) -> BridgeResult<BridgeConfig> {
    if !path.exists() {
        return Ok(BridgeConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        BridgeError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| {
            BridgeError::config_with_context(
                format!("Failed to parse TOML config: {}", e),
                format!("Deserializing TOML configuration from '{}'", path.display()),
            )
        })?,
        _ => serde_json::from_str(&content).map_err(|e| {
            BridgeError::config_with_context(
                format!("Failed to parse JSON config: {}", e),
                format!("Deserializing JSON configuration from '{}'", path.display()),
            )
        })?,
    };

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("toolbridge.json");
        let config_json = r#"{
            "relay": {
                "executable": "/opt/toolbridge/bin/toolbridge",
                "args": ["relay", "--verbose"]
            },
            "host": {
                "command": "demo-mcp",
                "env": {"DEMO_MODE": "1"}
            },
            "session": {"id": "s-42", "pid": 777},
            "call_timeout_secs": 30,
            "logging": {"level": "debug", "format": "json"}
        }"#;
        fs::write(&config_path, config_json).unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(
            config.relay.executable,
            PathBuf::from("/opt/toolbridge/bin/toolbridge")
        );
        assert_eq!(config.relay.args, vec!["relay", "--verbose"]);
        assert_eq!(config.host.command, "demo-mcp");
        assert_eq!(config.host.env.get("DEMO_MODE").map(String::as_str), Some("1"));
        assert_eq!(config.session.as_ref().and_then(|s| s.pid), Some(777));
        assert_eq!(config.call_timeout_secs, Some(30));
        assert!(config.logging.is_json());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("toolbridge.toml");
        let config_toml = r#"
call_timeout_secs = 5

[host]
command = "demo-mcp"
args = ["--stdio"]

[logging]
level = "warn"
"#;
        fs::write(&config_path, config_toml).unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.host.command, "demo-mcp");
        assert_eq!(config.call_timeout_secs, Some(5));
        assert_eq!(config.logging.level, "warn");
        // Omitted sections keep their defaults
        assert_eq!(config.relay.args, vec!["relay"]);
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let config = load_from_file(Path::new("/nonexistent/toolbridge.json")).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("toolbridge.json");
        fs::write(&config_path, "{ invalid json }").unwrap();

        let err = load_from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse JSON config"));
        assert!(err.context().unwrap().contains("toolbridge.json"));
    }
}
