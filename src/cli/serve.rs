use anyhow::Result;
use console::style;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{ServeFlags, load_config};
use crate::core::gateway::{GatewayClient, ToolInvoker};
use crate::core::lifecycle::LifecycleManager;
use crate::core::terminal::{GuideSection, print_goodbye};
use crate::interfaces::web::{ApiServer, ApiServerConfig};
use crate::logging;

pub async fn run_serve(flags: ServeFlags) -> Result<()> {
    let config = load_config(&flags)?;
    let log_tx = logging::init(config.tracing_level(), false);
    let config = Arc::new(config);

    let gateway: Arc<dyn ToolInvoker> = Arc::new(GatewayClient::new(&config));
    match &config.gateway_url {
        Some(url) => info!("Polling gateway at {}", url),
        None => warn!("GATEWAY_URL is not set; telemetry endpoints will report unavailable"),
    }

    let server = Arc::new(Mutex::new(ApiServer::new(ApiServerConfig {
        config: Arc::clone(&config),
        gateway,
        log_tx,
    })));
    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(server.clone());
    lifecycle.start().await?;

    let api_url = match server.lock().await.local_addr() {
        Some(addr) => format!("http://{}", addr),
        None => format!("http://{}:{}", config.api_host, config.api_port),
    };
    let gateway_line = match &config.gateway_url {
        Some(url) => style(url.as_str()).green().to_string(),
        None => style("not configured").red().bold().to_string(),
    };

    GuideSection::new("gatewatch")
        .status("API", &format!("{}", style(&api_url).underlined().cyan()))
        .status("Gateway", &gateway_line)
        .status("Telemetry", &format!("{}/api/telemetry", api_url))
        .blank()
        .info(&format!(
            "Run {} in another terminal to follow it live. Press {} to stop.",
            style(format!("gatewatch watch --api-url {}", api_url))
                .cyan()
                .bold(),
            style("Ctrl+C").bold().yellow()
        ))
        .print();
    println!();

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    print_goodbye();
    Ok(())
}
