//! Command routing logic for CLI

use crate::args::{Cli, Commands};
use crate::commands;
use std::path::Path;
use std::process::ExitCode;
use toolbridge_core::{Bridge, BridgeConfig};

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli, config: BridgeConfig) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Relay => {
            commands::relay::run(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            commands::status::show(&config, cli.verbose);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tools { json } => {
            let bridge = bridge_for(config, cli.config_file.as_deref());
            commands::tools::list(&bridge, json, cli.verbose).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Call { name, args, json } => {
            let bridge = bridge_for(config, cli.config_file.as_deref());
            commands::call::invoke(&bridge, &name, args, json, cli.verbose).await
        }
    }
}

fn bridge_for(config: BridgeConfig, config_file: Option<&Path>) -> Bridge {
    Bridge::from_config(&forward_config_file(config, config_file))
}

/// The relay re-reads the same configuration file as the caller
fn forward_config_file(mut config: BridgeConfig, config_file: Option<&Path>) -> BridgeConfig {
    if let Some(path) = config_file {
        config.relay.args.push("--config-file".to_string());
        config.relay.args.push(path.display().to_string());
    }
    config
}
