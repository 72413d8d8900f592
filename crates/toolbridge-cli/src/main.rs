//! toolbridge CLI
//!
//! One binary plays both roles of the chain:
//!
//! - `toolbridge relay` is the relay process. It speaks the relay protocol
//!   on stdin/stdout and drives the capability host. Logs go to stderr.
//! - `toolbridge status|tools|call` are foreground commands that spawn the
//!   relay through a [`toolbridge_core::Bridge`].

mod args;
mod commands;
mod console;
mod logging;
mod router;

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;

use args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match toolbridge_core::load_config(cli.config_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            logging::init(&Default::default(), cli.verbose);
            return Err(e).context("Failed to load configuration");
        }
    };
    logging::init(&config.logging, cli.verbose);

    router::route(cli, config).await
}
