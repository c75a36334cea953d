//! Turns a session's message history into terminal feed items.
//!
//! Each raw entry is first decoded into a [`HistoryEntry`] shape, then
//! expanded into zero or more [`TerminalItem`]s. Entries that fit none of the
//! recognized shapes produce nothing.

use serde_json::Value;
use std::collections::HashMap;

use super::coerce::{display_text, pick_instant, pick_string, to_array, truncate_text};
use super::types::{TerminalItem, TerminalItemKind};

const DETAIL_LIMIT: usize = 280;

const TIMESTAMP_KEYS: &[&str] = &["timestamp", "created_at", "createdAt", "ts"];

#[derive(Debug, PartialEq)]
pub enum HistoryEntry<'a> {
    /// Assistant message carrying an OpenAI-style `tool_calls` list.
    ToolCalls {
        calls: &'a [Value],
        role: Option<String>,
    },
    /// Content blocks tagged `toolCall` / `toolResult`.
    TaggedContent {
        blocks: Vec<&'a Value>,
        role: Option<String>,
    },
    System { text: String },
    Unclassified,
}

impl<'a> HistoryEntry<'a> {
    pub fn classify(raw: &'a Value) -> Self {
        let role = pick_string(raw, &["role", "type"]);

        if let Some(calls) = raw
            .get("tool_calls")
            .and_then(Value::as_array)
            .filter(|calls| !calls.is_empty())
        {
            return Self::ToolCalls {
                calls: calls.as_slice(),
                role,
            };
        }

        if let Some(content) = raw.get("content").and_then(Value::as_array) {
            let blocks: Vec<&Value> = content
                .iter()
                .filter(|block| block_tag(block).is_some())
                .collect();
            if !blocks.is_empty() {
                return Self::TaggedContent { blocks, role };
            }
        }

        if role.as_deref() == Some("system") {
            let text = message_text(raw);
            if !text.trim().is_empty() {
                return Self::System { text };
            }
        }

        Self::Unclassified
    }
}

/// Where the history array lives varies by gateway version.
pub fn history_entries(payload: &Value) -> &[Value] {
    if let Some(messages) = payload.get("messages").and_then(Value::as_array) {
        return messages;
    }
    to_array(payload)
}

/// Builds the terminal feed for one session. Ids are
/// `<session_key>:<anchor>:<n>`, where the anchor is the entry's own
/// timestamp, or `#<index>` of the entry in the history when it has none, and
/// `n` counts items sharing that anchor. The same history always yields the
/// same ids. `fallback_timestamp` only fills the displayed `timestamp` of
/// entries without one.
pub fn history_to_terminal(
    session_key: &str,
    payload: &Value,
    fallback_timestamp: &str,
) -> Vec<TerminalItem> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut items = Vec::new();

    for (index, raw) in history_entries(payload).iter().enumerate() {
        let stamp = pick_instant(raw, TIMESTAMP_KEYS);
        let anchor = stamp.clone().unwrap_or_else(|| format!("#{index}"));
        let timestamp = stamp.unwrap_or_else(|| fallback_timestamp.to_string());
        for draft in expand(HistoryEntry::classify(raw)) {
            let seq = seen.entry(anchor.clone()).or_insert(0);
            items.push(TerminalItem {
                id: format!("{session_key}:{anchor}:{seq}"),
                kind: draft.kind,
                source: draft.source,
                detail: draft.detail,
                role: draft.role,
                timestamp: timestamp.clone(),
            });
            *seq += 1;
        }
    }
    items
}

struct Draft {
    kind: TerminalItemKind,
    source: Option<String>,
    detail: Option<String>,
    role: Option<String>,
}

fn expand(entry: HistoryEntry<'_>) -> Vec<Draft> {
    match entry {
        HistoryEntry::ToolCalls { calls, role } => {
            let names: Vec<String> = calls.iter().filter_map(call_name).collect();
            let detail = calls
                .first()
                .and_then(call_arguments)
                .map(|text| truncate_text(&text, DETAIL_LIMIT));
            vec![Draft {
                kind: TerminalItemKind::ToolCall,
                source: (!names.is_empty()).then(|| names.join(", ")),
                detail,
                role,
            }]
        }
        HistoryEntry::TaggedContent { blocks, role } => blocks
            .into_iter()
            .filter_map(|block| {
                let kind = block_tag(block)?;
                let (source, detail) = match kind {
                    TerminalItemKind::ToolCall => (call_name(block), call_arguments(block)),
                    _ => (
                        pick_string(block, &["toolName", "tool_name", "name"]),
                        result_text(block),
                    ),
                };
                Some(Draft {
                    kind,
                    source,
                    detail: detail.map(|text| truncate_text(&text, DETAIL_LIMIT)),
                    role: role.clone(),
                })
            })
            .collect(),
        HistoryEntry::System { text } => vec![Draft {
            kind: TerminalItemKind::System,
            source: None,
            detail: Some(truncate_text(&text, DETAIL_LIMIT)),
            role: Some("system".to_string()),
        }],
        HistoryEntry::Unclassified => Vec::new(),
    }
}

fn block_tag(block: &Value) -> Option<TerminalItemKind> {
    match block.get("type").and_then(Value::as_str)? {
        "toolCall" => Some(TerminalItemKind::ToolCall),
        "toolResult" => Some(TerminalItemKind::ToolResult),
        _ => None,
    }
}

fn call_name(call: &Value) -> Option<String> {
    call.get("function")
        .and_then(|f| pick_string(f, &["name"]))
        .or_else(|| pick_string(call, &["name", "toolName", "tool_name"]))
}

fn call_arguments(call: &Value) -> Option<String> {
    call.get("function")
        .and_then(|f| f.get("arguments"))
        .or_else(|| {
            ["arguments", "args", "input"]
                .iter()
                .find_map(|key| call.get(*key))
        })
        .and_then(display_text)
}

fn result_text(block: &Value) -> Option<String> {
    if let Some(text) = block.get("content").map(message_text_from) {
        if !text.trim().is_empty() {
            return Some(text);
        }
    }
    ["result", "output", "text"]
        .iter()
        .find_map(|key| block.get(*key))
        .and_then(display_text)
}

fn message_text(raw: &Value) -> String {
    raw.get("content")
        .map(message_text_from)
        .or_else(|| pick_string(raw, &["text", "message"]))
        .unwrap_or_default()
}

/// Content is either a plain string or a list of `{type: "text", text}` blocks.
fn message_text_from(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                Value::String(s) => Some(s.as_str()),
                other => other.get("text").and_then(Value::as_str),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}
