use serde::Serialize;

use crate::core::telemetry::aggregate::is_operator_key;
use crate::core::telemetry::types::{
    Session, TelemetryResponse, TerminalItem, TerminalItemKind,
};

/// Sessions updated within this window count as active.
pub const ACTIVE_WINDOW_MS: i64 = 120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentActivity {
    Idle,
    Thinking,
    Executing,
}

impl AgentActivity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Executing => "executing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Operator,
    Subagent,
}

/// Recently updated sessions are busy: thinking when a thinking level is
/// set, executing otherwise. Sessions with no timestamp are idle.
pub fn classify_activity(session: &Session, now_ms: i64) -> AgentActivity {
    let recent = session
        .updated_at
        .is_some_and(|updated| now_ms.saturating_sub(updated) <= ACTIVE_WINDOW_MS);
    if !recent || session.aborted_last_run == Some(true) {
        return AgentActivity::Idle;
    }
    let thinking = session
        .thinking_level
        .as_deref()
        .is_some_and(|level| !level.eq_ignore_ascii_case("off"));
    if thinking {
        AgentActivity::Thinking
    } else {
        AgentActivity::Executing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub key: String,
    pub label: String,
    pub role: SessionRole,
    pub activity: AgentActivity,
    pub model: Option<String>,
    pub total_tokens: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewCounts {
    pub sessions: usize,
    pub subagents: usize,
    pub active: usize,
    pub tool_calls: usize,
    pub processes: usize,
    pub cron_jobs: usize,
    pub failed_runs: usize,
    pub queued: i64,
    pub warnings: usize,
}

/// Everything the watch client renders for one applied snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub connected: bool,
    pub generated_at: String,
    pub sessions: Vec<SessionView>,
    pub terminal: Vec<TerminalItem>,
    pub counts: ViewCounts,
    pub warnings: Vec<String>,
}

/// Counts cover the whole snapshot; lists are narrowed by `filter`, a
/// case-insensitive substring. An empty filter keeps everything.
pub fn derive_view(snapshot: &TelemetryResponse, filter: &str, now_ms: i64) -> DashboardView {
    let needle = filter.trim().to_lowercase();

    let all_sessions: Vec<SessionView> = snapshot
        .sessions
        .iter()
        .map(|session| session_view(session, now_ms))
        .collect();

    let counts = ViewCounts {
        sessions: all_sessions.len(),
        subagents: all_sessions
            .iter()
            .filter(|s| s.role == SessionRole::Subagent)
            .count(),
        active: all_sessions
            .iter()
            .filter(|s| s.activity != AgentActivity::Idle)
            .count(),
        tool_calls: snapshot
            .terminal
            .iter()
            .filter(|item| item.kind == TerminalItemKind::ToolCall)
            .count(),
        processes: snapshot.processes.len(),
        cron_jobs: snapshot.cron_jobs.len(),
        failed_runs: snapshot
            .cron_runs
            .iter()
            .filter(|run| run.error.is_some() || is_failure_status(run.status.as_deref()))
            .count(),
        queued: snapshot
            .queues
            .iter()
            .filter_map(|q| q.depth)
            .fold(0, i64::saturating_add),
        warnings: snapshot.warnings.len(),
    };

    let sessions = all_sessions
        .into_iter()
        .filter(|s| {
            matches_filter(&needle, &[Some(&s.key), Some(&s.label), s.model.as_ref()])
        })
        .collect();
    let terminal = snapshot
        .terminal
        .iter()
        .filter(|item| {
            matches_filter(&needle, &[item.source.as_ref(), item.detail.as_ref()])
        })
        .cloned()
        .collect();

    DashboardView {
        connected: snapshot.gateway.available,
        generated_at: snapshot.generated_at.clone(),
        sessions,
        terminal,
        counts,
        warnings: snapshot.warnings.clone(),
    }
}

fn session_view(session: &Session, now_ms: i64) -> SessionView {
    SessionView {
        key: session.key.clone(),
        label: session.label.clone().unwrap_or_else(|| session.key.clone()),
        role: if is_operator_key(&session.key) {
            SessionRole::Operator
        } else {
            SessionRole::Subagent
        },
        activity: classify_activity(session, now_ms),
        model: session.model.clone(),
        total_tokens: session.total_tokens,
    }
}

fn matches_filter(needle: &str, haystacks: &[Option<&String>]) -> bool {
    needle.is_empty()
        || haystacks
            .iter()
            .flatten()
            .any(|text| text.to_lowercase().contains(needle))
}

fn is_failure_status(status: Option<&str>) -> bool {
    matches!(
        status.map(str::to_ascii_lowercase).as_deref(),
        Some("error" | "failed" | "failure" | "timeout")
    )
}
