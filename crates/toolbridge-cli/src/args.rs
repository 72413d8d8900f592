//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "toolbridge")]
#[command(about = "Relay tool calls to a capability host over stdio")]
#[command(
    long_about = r#"Relay tool calls to a capability host over stdio

USAGE:
  toolbridge status                      # Installation and host resolution
  toolbridge tools                       # Connect and list tools
  toolbridge call <name> -a key=value    # Connect and invoke a tool
  toolbridge relay                       # Run as the relay process (stdin/stdout)"#
)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (JSON or TOML)
    #[arg(long, global = true, env = "TOOLBRIDGE_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run as the relay process, serving requests on stdin/stdout
    Relay,

    /// Show installation and connection state
    Status,

    /// Connect and list the host's tools
    Tools {
        /// Print the raw tool descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Connect and invoke one tool
    Call {
        /// Tool name
        name: String,

        /// Tool argument as key=value (repeatable)
        #[arg(short = 'a', long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Parse a `key=value` pair
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
