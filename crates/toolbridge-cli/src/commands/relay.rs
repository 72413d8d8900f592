//! Relay mode: serve the relay protocol on stdin/stdout

use toolbridge_core::{BridgeConfig, RelayServer};
use tracing::info;

pub async fn run(config: &BridgeConfig) -> anyhow::Result<()> {
    info!(
        host = %config.host.command,
        session = config.session.as_ref().map(|s| s.id.as_str()).unwrap_or("-"),
        "Starting relay"
    );

    let server = RelayServer::from_config(config);
    server
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await?;
    Ok(())
}
