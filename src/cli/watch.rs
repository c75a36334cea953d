use anyhow::Result;
use chrono::Utc;
use console::{Term, style};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use super::WatchFlags;
use crate::core::poller::view::{AgentActivity, SessionRole, derive_view};
use crate::core::poller::{HttpSnapshotSource, PollState, TelemetryPoller};
use crate::core::terminal::{print_goodbye, print_info};
use crate::core::telemetry::coerce::truncate_text;
use crate::core::telemetry::types::TerminalItemKind;
use crate::logging;

const TERMINAL_ROWS: usize = 12;

pub async fn run_watch(flags: WatchFlags) -> Result<()> {
    // The view owns stdout; logs only go to the broadcast channel.
    logging::init(Level::WARN, true);

    print_info(&format!(
        "Watching {} every {:.1}s (Ctrl+C to stop)",
        flags.api_url,
        flags.interval.as_secs_f64()
    ));

    let token = CancellationToken::new();
    let source = Arc::new(HttpSnapshotSource::new(&flags.api_url));
    let handle = TelemetryPoller::new(source, flags.interval).spawn(token.clone());
    let mut rx = handle.subscribe();
    let term = Term::stdout();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                let lines = render_lines(&state, &flags.filter, Utc::now().timestamp_millis());
                let _ = term.clear_screen();
                for line in lines {
                    println!("{}", line);
                }
            }
        }
    }

    token.cancel();
    handle.shutdown().await;
    print_goodbye();
    Ok(())
}

pub(crate) fn render_lines(state: &PollState, filter: &str, now_ms: i64) -> Vec<String> {
    let mut out = Vec::new();

    let Some(snapshot) = &state.snapshot else {
        out.push(match &state.fetch_error {
            Some(error) => format!("{} {}", style("○ server unreachable:").red().bold(), error),
            None => style("Waiting for first snapshot...").dim().to_string(),
        });
        return out;
    };

    let view = derive_view(snapshot, filter, now_ms);
    let indicator = if view.connected {
        style("● gateway connected").green().bold().to_string()
    } else {
        let reason = snapshot.gateway.error.as_deref().unwrap_or("unavailable");
        format!("{} ({})", style("○ gateway offline").red().bold(), reason)
    };
    out.push(format!(
        "{}  {}",
        indicator,
        style(format!("#{} @ {}", state.seq, view.generated_at)).dim()
    ));
    if let Some(error) = &state.fetch_error {
        out.push(format!(
            "{} {}",
            style("! last refresh failed:").yellow(),
            error
        ));
    }

    let c = &view.counts;
    out.push(format!(
        "sessions {}  subagents {}  active {}  tool calls {}  processes {}  cron {} ({} failed)  queued {}",
        c.sessions, c.subagents, c.active, c.tool_calls, c.processes, c.cron_jobs, c.failed_runs, c.queued
    ));
    if !filter.trim().is_empty() {
        out.push(style(format!("filter: \"{}\"", filter.trim())).dim().to_string());
    }

    out.push(String::new());
    out.push(style("Agents").bold().underlined().to_string());
    if view.sessions.is_empty() {
        out.push(style("  (none)").dim().to_string());
    }
    for session in &view.sessions {
        let role = match session.role {
            SessionRole::Operator => style("operator").magenta().bold(),
            SessionRole::Subagent => style("subagent").blue(),
        };
        let activity = match session.activity {
            AgentActivity::Thinking => style(session.activity.label()).yellow(),
            AgentActivity::Executing => style(session.activity.label()).green(),
            AgentActivity::Idle => style(session.activity.label()).dim(),
        };
        out.push(format!(
            "  {:<9} {:<10} {}{}",
            role,
            activity,
            session.label,
            session
                .model
                .as_ref()
                .map(|m| format!("  [{}]", m))
                .unwrap_or_default()
        ));
    }

    out.push(String::new());
    out.push(style("Terminal").bold().underlined().to_string());
    if view.terminal.is_empty() {
        out.push(style("  (quiet)").dim().to_string());
    }
    let skip = view.terminal.len().saturating_sub(TERMINAL_ROWS);
    for item in view.terminal.iter().skip(skip) {
        let tag = match item.kind {
            TerminalItemKind::ToolCall => style("→").cyan(),
            TerminalItemKind::ToolResult => style("←").green(),
            TerminalItemKind::System => style("•").yellow(),
        };
        out.push(format!(
            "  {} {} {}",
            tag,
            item.source.as_deref().unwrap_or("system"),
            style(truncate_text(item.detail.as_deref().unwrap_or(""), 100)).dim()
        ));
    }

    if !view.warnings.is_empty() {
        out.push(String::new());
        for warning in &view.warnings {
            out.push(format!("{} {}", style("!").yellow(), style(warning).dim()));
        }
    }
    out
}
