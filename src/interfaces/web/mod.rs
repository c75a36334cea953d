mod handlers;
mod router;

pub(crate) use router::build_api_router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::config::DashboardConfig;
use crate::core::gateway::ToolInvoker;
use crate::core::lifecycle::LifecycleComponent;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<DashboardConfig>,
    pub(crate) gateway: Arc<dyn ToolInvoker>,
    pub(crate) log_tx: broadcast::Sender<String>,
}

pub struct ApiServerConfig {
    pub config: Arc<DashboardConfig>,
    pub gateway: Arc<dyn ToolInvoker>,
    pub log_tx: broadcast::Sender<String>,
}

pub struct ApiServer {
    state: AppState,
    shutdown: CancellationToken,
    local_addr: Option<SocketAddr>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            state: AppState {
                config: config.config,
                gateway: config.gateway,
                log_tx: config.log_tx,
            },
            shutdown: CancellationToken::new(),
            local_addr: None,
        }
    }

    /// Bound address once started. Port 0 in config resolves here.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!(
            "API Server initializing (gateway {})",
            if self.state.config.gateway_configured() {
                "configured"
            } else {
                "not configured"
            }
        );
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.state.config.api_host, self.state.config.api_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", addr))?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        let app = build_api_router(self.state.clone());
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            info!("API Server running at http://{local_addr}");
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                tracing::error!("API Server crashed: {}", e);
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server shutting down...");
        self.shutdown.cancel();
        Ok(())
    }
}
