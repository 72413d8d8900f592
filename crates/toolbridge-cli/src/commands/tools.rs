//! Tools command: connect, list, disconnect

use crate::console::CliConsole;
use colored::*;
use toolbridge_core::Bridge;

pub async fn list(bridge: &Bridge, json: bool, verbose: bool) -> anyhow::Result<()> {
    let console = CliConsole::new(verbose);

    let info = bridge.connect().await?;
    console.info(&format!("Connected to {} {}", info.name, info.version));
    let tools = bridge.list_tools().await;
    bridge.disconnect().await?;
    let tools = tools?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    console.print_header(&format!("Tools from {}", info.name));
    for tool in &tools {
        let description = tool.description.as_deref().unwrap_or("");
        println!("  {:<28} {}", tool.name.as_str().cyan().bold(), description);
    }
    println!();
    println!("Total tools available: {}", tools.len());
    Ok(())
}
