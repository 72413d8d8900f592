//! Call command: connect, invoke one tool, disconnect

use crate::console::CliConsole;
use serde_json::{Map, Value};
use std::process::ExitCode;
use toolbridge_core::Bridge;

pub async fn invoke(
    bridge: &Bridge,
    name: &str,
    args: Vec<(String, String)>,
    json: bool,
    verbose: bool,
) -> anyhow::Result<ExitCode> {
    let console = CliConsole::new(verbose);
    let arguments: Map<String, Value> = args
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    bridge.connect().await?;
    console.info(&format!("Calling {}", name));
    let result = bridge.call_tool(name, arguments).await;
    bridge.disconnect().await?;
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let text = result.text_content();
        if !text.is_empty() {
            println!("{}", text);
        }
        let other_blocks = result
            .content
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) != Some("text"))
            .count();
        if other_blocks > 0 {
            console.info(&format!("{} non-text content block(s) omitted", other_blocks));
        }
    }

    if result.is_error {
        console.error(&format!("Tool '{}' reported an error", name));
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
