//! Client-side refresh loop for the telemetry endpoint.
//!
//! Each tick is its own round trip and may finish out of order. Responses are
//! stamped with the tick's sequence number when the tick starts, and a
//! response is applied only if it is newer than the one currently shown.

pub mod view;

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::telemetry::types::TelemetryResponse;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<TelemetryResponse, String>;
}

/// Reads snapshots from a running `gatewatch serve`.
pub struct HttpSnapshotSource {
    client: Client,
    url: String,
}

impl HttpSnapshotSource {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: Client::new(),
            url: format!("{}/api/telemetry", api_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<TelemetryResponse, String> {
        let res = self
            .client
            .get(&self.url)
            .header("Cache-Control", "no-store")
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            return Err(format!("HTTP {}", res.status()));
        }
        res.json::<TelemetryResponse>()
            .await
            .map_err(|e| e.to_string())
    }
}

/// What the client currently shows. A failed fetch keeps the last good
/// snapshot and records the error next to it.
#[derive(Debug, Clone, Default)]
pub struct PollState {
    /// Sequence number of the last applied response, 0 before the first.
    pub seq: u64,
    pub snapshot: Option<Arc<TelemetryResponse>>,
    pub fetch_error: Option<String>,
}

/// Applies `result` unless a newer tick already landed. Returns whether it was
/// applied.
pub fn apply_response(
    state: &watch::Sender<PollState>,
    seq: u64,
    result: Result<TelemetryResponse, String>,
) -> bool {
    state.send_if_modified(|current| {
        if seq <= current.seq {
            debug!("Dropping stale telemetry response #{} (showing #{})", seq, current.seq);
            return false;
        }
        current.seq = seq;
        match result {
            Ok(snapshot) => {
                current.snapshot = Some(Arc::new(snapshot));
                current.fetch_error = None;
            }
            Err(error) => current.fetch_error = Some(error),
        }
        true
    })
}

pub struct TelemetryPoller {
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
}

impl TelemetryPoller {
    pub fn new(source: Arc<dyn SnapshotSource>, interval: Duration) -> Self {
        Self {
            source,
            interval: interval.max(Duration::from_millis(100)),
        }
    }

    /// Starts ticking immediately. Cancelling `token` stops the loop and
    /// abandons in-flight fetches.
    pub fn spawn(self, token: CancellationToken) -> PollerHandle {
        let (tx, rx) = watch::channel(PollState::default());
        let tx = Arc::new(tx);
        let loop_token = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut next_seq: u64 = 0;
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                next_seq += 1;
                let seq = next_seq;
                let source = Arc::clone(&self.source);
                let tx = Arc::clone(&tx);
                let tick_token = loop_token.child_token();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tick_token.cancelled() => {}
                        result = source.fetch() => {
                            apply_response(&tx, seq, result);
                        }
                    }
                });
            }
            debug!("Telemetry poller stopped after {} ticks", next_seq);
        });

        PollerHandle { rx, token, task }
    }
}

pub struct PollerHandle {
    rx: watch::Receiver<PollState>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.rx.clone()
    }

    pub fn current(&self) -> PollState {
        self.rx.borrow().clone()
    }

    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.task.await;
    }
}
