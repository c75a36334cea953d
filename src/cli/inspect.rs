use anyhow::Result;
use chrono::Utc;

use super::{InvokeArgs, ServeFlags, load_config};
use crate::core::gateway::{GatewayClient, ToolInvoker};
use crate::core::telemetry::aggregate::build_snapshot;
use crate::logging;

/// Prints one snapshot as pretty JSON. Stdout carries only the JSON.
pub async fn run_snapshot(flags: ServeFlags) -> Result<()> {
    let config = load_config(&flags)?;
    logging::init(config.tracing_level(), true);

    let client = GatewayClient::new(&config);
    let snapshot = build_snapshot(&client, &config, Utc::now()).await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

pub async fn run_invoke(invoke: InvokeArgs) -> Result<()> {
    let config = load_config(&ServeFlags {
        config: invoke.config.clone(),
        ..ServeFlags::default()
    })?;
    logging::init(config.tracing_level(), true);

    let client = GatewayClient::new(&config);
    let outcome = client.invoke(&invoke.tool, invoke.args).await;
    println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);

    match outcome.error() {
        Some(error) => anyhow::bail!("{} failed: {}", invoke.tool, error),
        None => Ok(()),
    }
}
