//! Status command: installation and host resolution, without connecting

use crate::console::CliConsole;
use toolbridge_core::session::{CommandProbe, InstallationProbe};
use toolbridge_core::{Bridge, BridgeConfig, ConnectionState};

pub fn show(config: &BridgeConfig, verbose: bool) {
    let console = CliConsole::new(verbose);
    let bridge = Bridge::from_config(config);
    let state = bridge.state();

    console.print_header("toolbridge status");
    console.field("Relay", &config.relay.executable.display().to_string());
    console.field("State", &format!("{} ({})", state, state.description()));

    let host = CommandProbe::new(&config.host.command);
    let resolved = host
        .resolve()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "not found".to_string());
    console.field("Host command", &config.host.command);
    console.field("Host resolves to", &resolved);

    if let Some(session) = &config.session {
        let pid = session
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".to_string());
        console.field("Session", &format!("{} (pid {})", session.id, pid));
    }
    match config.call_timeout_secs {
        Some(secs) => console.field("Call timeout", &format!("{}s", secs)),
        None => console.field("Call timeout", "none"),
    }

    println!();
    if state == ConnectionState::NotInstalled {
        console.warn("Relay executable not found; install it or set TOOLBRIDGE_RELAY_PATH");
    } else if !host.is_installed() {
        console.warn("Host command not found on PATH");
    } else {
        console.success("Ready to connect");
    }
}
