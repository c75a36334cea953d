//! Builds telemetry snapshots out of individual gateway tool invokes.
//!
//! Every lookup is attempted independently. A missing tool costs one warning
//! and an empty collection, never the whole snapshot.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::warn;

use super::history::history_to_terminal;
use super::normalize::{decode_list, decode_usage};
use super::types::{
    BackgroundFeed, CronJob, CronRun, Decode, GatewayStatus, ProcessItem, QueueItem,
    RiskIndicators, Session, SessionStatus, SystemEvent, TelemetryResponse, TerminalItem,
};
use crate::core::config::DashboardConfig;
use crate::core::gateway::{InvokeOutcome, ToolInvoker, embedded_error};

/// Session keys containing this belong to the operator session.
pub const MAIN_SESSION_MARKER: &str = ":main:main";

pub const SESSIONS_TOOL: &str = "sessions_list";
pub const HISTORY_TOOL: &str = "sessions_history";
pub const STATUS_TOOL: &str = "session_status";

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCandidate {
    pub tool: String,
    pub args: Value,
}

impl ToolCandidate {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }

    pub fn bare(tool: impl Into<String>) -> Self {
        Self::new(tool, json!({}))
    }

    /// `cron(runs)` for action-style tools, the plain name otherwise.
    pub fn label(&self) -> String {
        match self.args.get("action").and_then(Value::as_str) {
            Some(action) => format!("{}({})", self.tool, action),
            None => self.tool.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tried {}", .attempted.join(", "))]
pub struct CandidatesExhausted {
    pub attempted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsableResult {
    pub source: String,
    pub result: Value,
}

/// A result counts only when the call succeeded and the tool did not report
/// an error inside it.
pub fn usable_result(outcome: InvokeOutcome) -> Result<Value, String> {
    match outcome {
        InvokeOutcome::Success { result, .. } => match embedded_error(&result) {
            Some(error) => Err(error),
            None => Ok(result),
        },
        InvokeOutcome::Failure { error, .. } => Err(error.to_string()),
    }
}

/// Tries each candidate in order and stops at the first usable result.
pub async fn first_usable(
    invoker: &dyn ToolInvoker,
    candidates: &[ToolCandidate],
) -> Result<UsableResult, CandidatesExhausted> {
    let mut attempted = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let label = candidate.label();
        match usable_result(invoker.invoke(&candidate.tool, candidate.args.clone()).await) {
            Ok(result) => {
                return Ok(UsableResult {
                    source: label,
                    result,
                });
            }
            Err(_) => attempted.push(label),
        }
    }
    Err(CandidatesExhausted { attempted })
}

pub fn cron_job_candidates() -> Vec<ToolCandidate> {
    vec![
        ToolCandidate::new("cron", json!({"action": "list"})),
        ToolCandidate::bare("cron_list"),
        ToolCandidate::bare("cron_jobs"),
    ]
}

pub fn cron_run_candidates() -> Vec<ToolCandidate> {
    vec![
        ToolCandidate::new("cron", json!({"action": "runs"})),
        ToolCandidate::new("cron", json!({"action": "run"})),
        ToolCandidate::bare("cron_runs_list"),
        ToolCandidate::bare("cron_history"),
        ToolCandidate::bare("cron_runs"),
    ]
}

pub fn process_candidates(config: &DashboardConfig) -> Vec<ToolCandidate> {
    let mut candidates = Vec::new();
    if let Some(tool) = &config.background_tool {
        candidates.push(ToolCandidate::bare(tool.as_str()));
    }
    candidates.push(ToolCandidate::new("process", json!({"action": "list"})));
    candidates.push(ToolCandidate::bare("process_list"));
    candidates
}

pub fn queue_candidates() -> Vec<ToolCandidate> {
    vec![
        ToolCandidate::bare("queue_status"),
        ToolCandidate::bare("queues_list"),
    ]
}

pub fn event_candidates() -> Vec<ToolCandidate> {
    vec![
        ToolCandidate::bare("system_events"),
        ToolCandidate::bare("events_list"),
    ]
}

pub fn usage_candidates() -> Vec<ToolCandidate> {
    vec![
        ToolCandidate::bare("usage_status"),
        ToolCandidate::bare("usage_cost"),
        ToolCandidate::bare("usage"),
    ]
}

pub fn rerun_candidates(job_id: &str) -> Vec<ToolCandidate> {
    vec![
        ToolCandidate::new("cron", json!({"action": "run", "jobId": job_id})),
        ToolCandidate::new("cron_run", json!({"jobId": job_id})),
        ToolCandidate::new("cron_trigger", json!({"jobId": job_id})),
    ]
}

/// First session carrying the operator marker, else the first session.
pub fn select_main_session(sessions: &[Session]) -> Option<&Session> {
    sessions
        .iter()
        .find(|session| is_operator_key(&session.key))
        .or_else(|| sessions.first())
}

pub fn is_operator_key(key: &str) -> bool {
    key.contains(MAIN_SESSION_MARKER)
}

pub fn iso_now(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionList {
    pub gateway: GatewayStatus,
    pub sessions: Vec<Session>,
}

/// Lists sessions and reports whether the gateway answered.
pub async fn fetch_sessions(invoker: &dyn ToolInvoker, config: &DashboardConfig) -> SessionList {
    let mut gateway = GatewayStatus {
        configured: invoker.is_configured(),
        ..GatewayStatus::default()
    };
    let outcome = invoker
        .invoke(SESSIONS_TOOL, json!({"limit": config.session_limit}))
        .await;
    gateway.latency_ms = outcome.latency_ms();

    match usable_result(outcome) {
        Ok(result) => {
            gateway.available = true;
            SessionList {
                gateway,
                sessions: decode_list(&result),
            }
        }
        Err(error) => {
            gateway.error = Some(error);
            SessionList {
                gateway,
                sessions: Vec::new(),
            }
        }
    }
}

pub async fn fetch_terminal(
    invoker: &dyn ToolInvoker,
    session_key: &str,
    limit: u32,
    now: DateTime<Utc>,
) -> Result<Vec<TerminalItem>, String> {
    let outcome = invoker
        .invoke(
            HISTORY_TOOL,
            json!({"sessionKey": session_key, "limit": limit}),
        )
        .await;
    let result = usable_result(outcome)?;
    Ok(history_to_terminal(session_key, &result, &iso_now(now)))
}

pub async fn fetch_status(
    invoker: &dyn ToolInvoker,
    session_key: &str,
) -> Result<SessionStatus, String> {
    let outcome = invoker
        .invoke(STATUS_TOOL, json!({"sessionKey": session_key}))
        .await;
    let result = usable_result(outcome)?;
    if let Ok(status) = SessionStatus::decode(&result) {
        return Ok(status);
    }
    // Status payloads often omit the key they were asked about.
    let keyed = match result {
        Value::Object(mut map) => {
            map.insert("sessionKey".to_string(), json!(session_key));
            Value::Object(map)
        }
        other => json!({"sessionKey": session_key, "statusText": other}),
    };
    SessionStatus::decode(&keyed).map_err(|e| e.to_string())
}

/// Assembles one snapshot. Never fails: whatever could not be fetched is
/// empty and explained in `warnings`.
pub async fn build_snapshot(
    invoker: &dyn ToolInvoker,
    config: &DashboardConfig,
    now: DateTime<Utc>,
) -> TelemetryResponse {
    let mut snapshot = TelemetryResponse {
        generated_at: iso_now(now),
        risk: RiskIndicators {
            level: config.risk_level.clone(),
            note: config.risk_note.clone(),
        },
        ..TelemetryResponse::default()
    };
    let mut warnings = Warnings::default();

    if !invoker.is_configured() {
        snapshot.gateway.error = Some("Gateway URL is not configured".to_string());
        warnings.push("gateway not configured; set GATEWAY_URL to enable telemetry".to_string());
        snapshot.warnings = warnings.into_inner();
        return snapshot;
    }

    let listed = fetch_sessions(invoker, config).await;
    snapshot.gateway = listed.gateway;
    snapshot.sessions = listed.sessions;

    if snapshot.gateway.available {
        snapshot
            .sources
            .insert("sessions".to_string(), SESSIONS_TOOL.to_string());
        let main_key = select_main_session(&snapshot.sessions).map(|s| s.key.clone());
        if let Some(key) = &main_key {
            match fetch_terminal(invoker, key, config.history_limit, now).await {
                Ok(items) => {
                    snapshot.terminal = items;
                    snapshot
                        .sources
                        .insert("terminal".to_string(), HISTORY_TOOL.to_string());
                }
                Err(error) => warnings.push(format!("terminal history unavailable ({})", error)),
            }
            match fetch_status(invoker, key).await {
                Ok(status) => {
                    snapshot.main_status = Some(status);
                    snapshot
                        .sources
                        .insert("status".to_string(), STATUS_TOOL.to_string());
                }
                Err(error) => warnings.push(format!("session status unavailable ({})", error)),
            }
        }
        snapshot.main_session_key = main_key;
    } else {
        let error = snapshot.gateway.error.as_deref().unwrap_or("unknown error");
        warnings.push(format!("sessions unavailable ({})", error));
        warnings.push("session history and status skipped".to_string());
    }

    if let Some(found) = lookup(invoker, "cron jobs", &cron_job_candidates(), &mut warnings).await {
        snapshot.cron_jobs = decode_list::<CronJob>(&found.result);
        snapshot.sources.insert("cronJobs".to_string(), found.source);
    }
    if let Some(found) = lookup(invoker, "cron runs", &cron_run_candidates(), &mut warnings).await {
        snapshot.cron_runs = decode_list::<CronRun>(&found.result);
        snapshot.sources.insert("cronRuns".to_string(), found.source);
    }
    if let Some(found) =
        lookup(invoker, "processes", &process_candidates(config), &mut warnings).await
    {
        snapshot.processes = decode_list::<ProcessItem>(&found.result);
        snapshot.sources.insert("processes".to_string(), found.source);
    }
    if let Some(found) = lookup(invoker, "queues", &queue_candidates(), &mut warnings).await {
        snapshot.queues = decode_list::<QueueItem>(&found.result);
        snapshot.sources.insert("queues".to_string(), found.source);
    }
    if let Some(found) = lookup(invoker, "events", &event_candidates(), &mut warnings).await {
        snapshot.events = decode_list::<SystemEvent>(&found.result);
        snapshot.sources.insert("events".to_string(), found.source);
    }
    if let Some(found) = lookup(invoker, "usage", &usage_candidates(), &mut warnings).await {
        snapshot.usage = decode_usage(&found.result);
        snapshot.sources.insert("usage".to_string(), found.source);
    }

    snapshot.warnings = warnings.into_inner();
    snapshot
}

/// Processes only, with the background-tool override tried first.
pub async fn background_feed(
    invoker: &dyn ToolInvoker,
    config: &DashboardConfig,
    now: DateTime<Utc>,
) -> BackgroundFeed {
    let mut feed = BackgroundFeed {
        generated_at: iso_now(now),
        gateway: GatewayStatus {
            configured: invoker.is_configured(),
            ..GatewayStatus::default()
        },
        ..BackgroundFeed::default()
    };
    let mut warnings = Warnings::default();

    if !feed.gateway.configured {
        feed.gateway.error = Some("Gateway URL is not configured".to_string());
        warnings.push("gateway not configured; set GATEWAY_URL to enable telemetry".to_string());
    } else if let Some(found) =
        lookup(invoker, "processes", &process_candidates(config), &mut warnings).await
    {
        feed.gateway.available = true;
        feed.processes = decode_list(&found.result);
        feed.source = Some(found.source);
    }

    feed.warnings = warnings.into_inner();
    feed
}

pub async fn rerun_cron_job(
    invoker: &dyn ToolInvoker,
    job_id: &str,
) -> Result<UsableResult, CandidatesExhausted> {
    first_usable(invoker, &rerun_candidates(job_id)).await
}

async fn lookup(
    invoker: &dyn ToolInvoker,
    category: &str,
    candidates: &[ToolCandidate],
    warnings: &mut Warnings,
) -> Option<UsableResult> {
    match first_usable(invoker, candidates).await {
        Ok(found) => Some(found),
        Err(exhausted) => {
            warnings.push(format!("{} unavailable ({})", category, exhausted));
            None
        }
    }
}

/// Collects warnings and logs each one as it is recorded.
#[derive(Default)]
struct Warnings(Vec<String>);

impl Warnings {
    fn push(&mut self, message: String) {
        warn!("Telemetry: {}", message);
        self.0.push(message);
    }

    fn into_inner(self) -> Vec<String> {
        self.0
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::gateway::GatewayError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory gateway answering from a table keyed by candidate label.
    /// Unknown tools fail with a 404.
    pub(crate) struct ScriptedInvoker {
        pub configured: bool,
        pub responses: HashMap<String, Value>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedInvoker {
        pub(crate) fn new() -> Self {
            Self {
                configured: true,
                responses: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn unconfigured() -> Self {
            Self {
                configured: false,
                ..Self::new()
            }
        }

        pub(crate) fn respond(mut self, label: &str, result: Value) -> Self {
            self.responses.insert(label.to_string(), result);
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolInvoker for ScriptedInvoker {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn invoke(&self, tool: &str, args: Value) -> InvokeOutcome {
            let label = ToolCandidate::new(tool, args).label();
            self.calls.lock().unwrap().push(label.clone());
            if !self.configured {
                return InvokeOutcome::Failure {
                    error: GatewayError::NotConfigured,
                    latency_ms: None,
                };
            }
            match self.responses.get(&label) {
                Some(result) => InvokeOutcome::Success {
                    result: result.clone(),
                    latency_ms: 3,
                    status: 200,
                },
                None => InvokeOutcome::Failure {
                    error: GatewayError::Http {
                        status: 404,
                        message: format!("Tool not available: {}", tool),
                    },
                    latency_ms: Some(1),
                },
            }
        }
    }
}
