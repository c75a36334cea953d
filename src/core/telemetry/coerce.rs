//! Total conversions from untyped gateway JSON into the scalar shapes the
//! telemetry schema uses. Nothing in here returns an error or panics: any
//! value that cannot be read as the requested type is simply absent.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Wrapper keys probed by [`to_array`], in priority order.
const ARRAY_KEYS: &[&str] = &[
    "sessions",
    "items",
    "runs",
    "jobs",
    "events",
    "processes",
    "queues",
    "records",
    "data",
];

/// Numeric instants below this are taken as epoch seconds rather than millis.
const EPOCH_SECONDS_CEILING: f64 = 100_000_000_000.0;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn to_optional_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn to_optional_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// Reads the value as a calendar date and renders it as
/// `YYYY-MM-DDTHH:MM:SS.mmmZ`. Naive date-times are taken as UTC.
pub fn to_optional_timestamp(value: &Value) -> Option<String> {
    let raw = to_optional_string(value)?;
    parse_datetime(raw.trim()).map(format_iso)
}

/// Like [`to_optional_timestamp`], but numbers (and numeric strings) are read
/// as epoch seconds or milliseconds first. Gateways report message times both
/// ways.
pub fn to_optional_instant(value: &Value) -> Option<String> {
    to_optional_epoch_millis(value)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(format_iso)
}

pub fn to_optional_epoch_millis(value: &Value) -> Option<i64> {
    if let Some(n) = to_optional_number(value) {
        let millis = if n.abs() < EPOCH_SECONDS_CEILING {
            n * 1000.0
        } else {
            n
        };
        return Some(millis.round() as i64);
    }
    let raw = to_optional_string(value)?;
    parse_datetime(raw.trim()).map(|dt| dt.timestamp_millis())
}

pub fn millis_to_iso(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(format_iso)
}

pub fn to_array(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => ARRAY_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

/// First present, non-null field among `keys`.
pub fn first_field<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null())
}

/// First field among `keys` that reads as a non-blank string.
pub fn pick_string(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(to_optional_string)
        .find(|s| !s.trim().is_empty())
}

pub fn pick_number(raw: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(to_optional_number)
}

pub fn pick_integer(raw: &Value, keys: &[&str]) -> Option<i64> {
    pick_number(raw, keys).map(|n| n.round() as i64)
}

pub fn pick_instant(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(to_optional_instant)
}

pub fn pick_bool(raw: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().filter_map(|key| raw.get(*key)).find_map(|value| match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Walks nested objects, e.g. `["state", "nextRunAtMs"]`.
pub fn field_path<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cursor = raw;
    for key in path {
        cursor = cursor.get(*key)?;
    }
    (!cursor.is_null()).then_some(cursor)
}

/// Renders any JSON value as display text: strings verbatim, everything else
/// as compact JSON.
pub fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => serde_json::to_string(other).ok(),
    }
}

pub fn truncate_text(raw: &str, limit: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn format_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
