use serde_json::Value;
use tracing::debug;

use super::coerce::{
    display_text, field_path, millis_to_iso, pick_bool, pick_instant, pick_integer, pick_number,
    pick_string, to_array, to_optional_epoch_millis, to_optional_instant, to_optional_string,
    truncate_text,
};
use super::types::{
    CronJob, CronRun, Decode, DecodeError, ProcessItem, QueueItem, Session, SessionStatus,
    SystemEvent, UsageItem,
};

/// Candidate sources for a session's `updatedAt`, highest priority first.
const SESSION_UPDATED_KEYS: &[&str] = &["updatedAt", "updated_at", "lastActivity", "created_at"];

const SUMMARY_LIMIT: usize = 240;

/// Decodes every record found in `payload`, skipping the ones that fail.
pub fn decode_list<T: Decode>(payload: &Value) -> Vec<T> {
    to_array(payload)
        .iter()
        .filter_map(|raw| match T::decode(raw) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!("Skipping {} record: {}", T::ENTITY, e);
                None
            }
        })
        .collect()
}

impl Decode for Session {
    const ENTITY: &'static str = "session";

    fn decode(raw: &Value) -> Result<Self, DecodeError> {
        Self::require_object(raw)?;
        let key = pick_string(
            raw,
            &["key", "sessionKey", "session_key", "session_id", "sessionId", "id"],
        )
        .ok_or_else(|| Self::missing("key"))?;

        let updated_at = SESSION_UPDATED_KEYS
            .iter()
            .filter_map(|k| raw.get(*k))
            .find_map(to_optional_epoch_millis);
        let last_activity = updated_at
            .and_then(millis_to_iso)
            .or_else(|| pick_instant(raw, &["lastActivityAt", "last_activity"]));

        Ok(Self {
            key,
            label: pick_string(raw, &["label", "displayName", "display_name", "title"]),
            channel: pick_string(raw, &["channel", "lastChannel", "last_channel", "provider"]),
            kind: pick_string(raw, &["kind", "type", "chatType"]),
            model: pick_string(raw, &["model", "modelId", "model_id"]),
            updated_at,
            total_tokens: pick_integer(raw, &["totalTokens", "total_tokens", "tokens"]),
            thinking_level: pick_string(raw, &["thinkingLevel", "thinking_level", "thinking"]),
            aborted_last_run: pick_bool(raw, &["abortedLastRun", "aborted_last_run"]),
            turns: pick_integer(raw, &["turns", "messageCount", "message_count"]),
            last_activity,
        })
    }
}

impl Decode for SessionStatus {
    const ENTITY: &'static str = "session status";

    fn decode(raw: &Value) -> Result<Self, DecodeError> {
        Self::require_object(raw)?;
        // Some gateways nest the interesting fields one level down.
        let body = raw
            .get("session")
            .filter(|v| v.is_object())
            .unwrap_or(raw);
        let key = pick_string(body, &["key", "sessionKey", "session_key", "sessionId"])
            .or_else(|| pick_string(raw, &["sessionKey", "key"]))
            .ok_or_else(|| Self::missing("key"))?;
        Ok(Self {
            key,
            model: pick_string(body, &["model", "modelId", "model_id"]),
            thinking_level: pick_string(body, &["thinkingLevel", "thinking_level", "thinking"]),
            context_tokens: pick_integer(body, &["contextTokens", "context_tokens"]),
            total_tokens: pick_integer(body, &["totalTokens", "total_tokens"]),
            summary: pick_string(raw, &["statusText", "summary", "text"])
                .map(|text| truncate_text(&text, SUMMARY_LIMIT)),
        })
    }
}

impl Decode for ProcessItem {
    const ENTITY: &'static str = "process";

    fn decode(raw: &Value) -> Result<Self, DecodeError> {
        Self::require_object(raw)?;
        let pid = pick_integer(raw, &["pid"]);
        let command = pick_string(raw, &["command", "cmd", "name"]);
        let id = pick_string(raw, &["id", "processId", "process_id", "sessionId"])
            .or_else(|| pid.map(|p| p.to_string()))
            .or_else(|| command.clone())
            .ok_or_else(|| Self::missing("id"))?;
        Ok(Self {
            id,
            command,
            status: pick_string(raw, &["status", "state"]),
            pid,
            cpu: pick_number(raw, &["cpu", "cpu_pct", "cpuPercent", "cpu_percent"]),
            memory_mb: pick_number(raw, &["memoryMb", "memory_mb", "mem_mb", "memory", "mem"]),
            started_at: pick_instant(raw, &["startedAt", "started_at", "createdAt", "created_at"]),
            session_key: pick_string(raw, &["sessionKey", "session_key"]),
        })
    }
}

impl Decode for CronJob {
    const ENTITY: &'static str = "cron job";

    fn decode(raw: &Value) -> Result<Self, DecodeError> {
        Self::require_object(raw)?;
        let id = pick_string(raw, &["id", "jobId", "job_id", "name"])
            .ok_or_else(|| Self::missing("id"))?;
        Ok(Self {
            id,
            name: pick_string(raw, &["name", "label", "title"]),
            schedule: schedule_text(raw),
            enabled: pick_bool(raw, &["enabled", "active"]),
            next_run_at: pick_instant(raw, &["nextRunAt", "next_run_at", "nextRunAtMs"])
                .or_else(|| {
                    field_path(raw, &["state", "nextRunAtMs"])
                        .and_then(to_optional_instant)
                }),
            last_run_at: pick_instant(raw, &["lastRunAt", "last_run_at", "lastRunAtMs"])
                .or_else(|| {
                    field_path(raw, &["state", "lastRunAtMs"])
                        .and_then(to_optional_instant)
                }),
            last_status: pick_string(raw, &["lastStatus", "last_status"]).or_else(|| {
                field_path(raw, &["state", "lastStatus"])
                    .and_then(to_optional_string)
            }),
        })
    }
}

/// Schedules arrive as a plain expression or as `{kind, expr|everyMs|at}`.
fn schedule_text(raw: &Value) -> Option<String> {
    if let Some(text) = pick_string(raw, &["schedule", "cron", "expr", "expression"]) {
        return Some(text);
    }
    let schedule = raw.get("schedule").filter(|v| v.is_object())?;
    if let Some(expr) = pick_string(schedule, &["expr", "cron", "expression"]) {
        return Some(expr);
    }
    if let Some(every) = pick_integer(schedule, &["everyMs", "every_ms"]) {
        return Some(format!("every {}s", every / 1000));
    }
    pick_string(schedule, &["at", "kind"])
}

impl Decode for CronRun {
    const ENTITY: &'static str = "cron run";

    fn decode(raw: &Value) -> Result<Self, DecodeError> {
        Self::require_object(raw)?;
        let job_id = pick_string(raw, &["jobId", "job_id", "job"]);
        let started_at = pick_instant(
            raw,
            &["startedAt", "started_at", "runAtMs", "ts", "timestamp"],
        );
        let id = pick_string(raw, &["id", "runId", "run_id"])
            .or_else(|| match (&job_id, &started_at) {
                (Some(job), Some(at)) => Some(format!("{job}:{at}")),
                _ => None,
            })
            .ok_or_else(|| Self::missing("id"))?;
        Ok(Self {
            id,
            job_id,
            status: pick_string(raw, &["status", "result", "outcome"]),
            started_at,
            finished_at: pick_instant(raw, &["finishedAt", "finished_at", "endedAt", "ended_at"]),
            duration_ms: pick_integer(raw, &["durationMs", "duration_ms", "duration"]),
            error: pick_string(raw, &["error", "errorMessage", "error_message"]),
            summary: pick_string(raw, &["summary", "output", "message"])
                .map(|text| truncate_text(&text, SUMMARY_LIMIT)),
        })
    }
}

impl Decode for QueueItem {
    const ENTITY: &'static str = "queue";

    fn decode(raw: &Value) -> Result<Self, DecodeError> {
        Self::require_object(raw)?;
        let name = pick_string(raw, &["name", "queue", "lane", "id"])
            .ok_or_else(|| Self::missing("name"))?;
        Ok(Self {
            name,
            depth: pick_integer(raw, &["depth", "size", "length", "queued", "pending", "count"]),
            active: pick_integer(raw, &["active", "running", "inFlight", "in_flight"]),
            lane: pick_string(raw, &["lane", "kind"]),
        })
    }
}

impl Decode for SystemEvent {
    const ENTITY: &'static str = "event";

    fn decode(raw: &Value) -> Result<Self, DecodeError> {
        Self::require_object(raw)?;
        let message = pick_string(raw, &["message", "text", "summary", "detail"])
            .or_else(|| raw.get("payload").and_then(display_text))
            .map(|text| truncate_text(&text, SUMMARY_LIMIT));
        let kind = pick_string(raw, &["kind", "type", "event", "name"]);
        if message.is_none() && kind.is_none() {
            return Err(Self::missing("message"));
        }
        Ok(Self {
            id: pick_string(raw, &["id", "eventId", "event_id", "seq"]),
            kind,
            message,
            level: pick_string(raw, &["level", "severity"]),
            source: pick_string(raw, &["source", "sessionKey", "session_key", "origin"]),
            timestamp: pick_instant(raw, &["timestamp", "ts", "createdAt", "created_at", "at"]),
        })
    }
}

impl Decode for UsageItem {
    const ENTITY: &'static str = "usage";

    fn decode(raw: &Value) -> Result<Self, DecodeError> {
        Self::require_object(raw)?;
        let input_tokens = pick_integer(raw, &["inputTokens", "input_tokens", "input", "prompt_tokens"]);
        let output_tokens = pick_integer(
            raw,
            &["outputTokens", "output_tokens", "output", "completion_tokens"],
        );
        let total_tokens = pick_integer(raw, &["totalTokens", "total_tokens", "tokens", "total"])
            .or_else(|| match (input_tokens, output_tokens) {
                (None, None) => None,
                (i, o) => Some(i.unwrap_or(0).saturating_add(o.unwrap_or(0))),
            });
        let cost_usd = pick_number(raw, &["costUsd", "cost_usd", "cost", "totalCost"]);
        if total_tokens.is_none() && cost_usd.is_none() {
            return Err(Self::missing("totals"));
        }
        Ok(Self {
            label: pick_string(raw, &["label", "model", "provider", "name", "window"])
                .unwrap_or_else(|| "total".to_string()),
            input_tokens,
            output_tokens,
            total_tokens,
            cost_usd,
            window: pick_string(raw, &["window", "period", "range"]),
        })
    }
}

/// Usage tools answer either with a list of rows or with one totals object.
pub fn decode_usage(payload: &Value) -> Vec<UsageItem> {
    let rows = decode_list::<UsageItem>(payload);
    if !rows.is_empty() {
        return rows;
    }
    for key in ["models", "providers", "byModel"] {
        if let Some(nested) = payload.get(key).filter(|v| v.is_array()) {
            let rows = decode_list::<UsageItem>(nested);
            if !rows.is_empty() {
                return rows;
            }
        }
    }
    let totals = payload.get("totals").unwrap_or(payload);
    UsageItem::decode(totals).into_iter().collect()
}
