use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::core::config::DashboardConfig;

pub const INVOKE_PATH: &str = "/tools/invoke";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Gateway URL is not configured")]
    NotConfigured,
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("{0}")]
    Transport(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result of exactly one invoke attempt.
#[derive(Debug, Clone)]
pub enum InvokeOutcome {
    Success {
        result: Value,
        latency_ms: u64,
        status: u16,
    },
    Failure {
        error: GatewayError,
        /// Absent when no request was sent.
        latency_ms: Option<u64>,
    },
}

impl InvokeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success { result, .. } => Some(result),
            Self::Failure { .. } => None,
        }
    }

    pub fn latency_ms(&self) -> Option<u64> {
        match self {
            Self::Success { latency_ms, .. } => Some(*latency_ms),
            Self::Failure { latency_ms, .. } => *latency_ms,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status, .. } => Some(*status),
            Self::Failure { error, .. } => error.status(),
        }
    }

    pub fn error(&self) -> Option<&GatewayError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Success {
                result,
                latency_ms,
                status,
            } => json!({
                "ok": true,
                "result": result,
                "latencyMs": latency_ms,
                "status": status,
            }),
            Self::Failure { error, latency_ms } => json!({
                "ok": false,
                "error": error.to_string(),
                "latencyMs": latency_ms,
                "status": error.status(),
            }),
        }
    }
}

/// Anything that can run a named gateway tool. The HTTP client is the only
/// production implementation; tests script their own.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn invoke(&self, tool: &str, args: Value) -> InvokeOutcome;
}

pub struct GatewayClient {
    endpoint: Option<Url>,
    token: Option<String>,
    client: Client,
}

impl GatewayClient {
    pub fn new(config: &DashboardConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            endpoint: config.gateway_url.as_ref().and_then(invoke_endpoint),
            token: config.gateway_token.clone(),
            client,
        }
    }
}

fn invoke_endpoint(base: &Url) -> Option<Url> {
    let joined = format!("{}{}", base.as_str().trim_end_matches('/'), INVOKE_PATH);
    Url::parse(&joined).ok()
}

#[async_trait]
impl ToolInvoker for GatewayClient {
    fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn invoke(&self, tool: &str, args: Value) -> InvokeOutcome {
        let Some(endpoint) = &self.endpoint else {
            return InvokeOutcome::Failure {
                error: GatewayError::NotConfigured,
                latency_ms: None,
            };
        };

        let started = Instant::now();
        let mut request = self
            .client
            .post(endpoint.clone())
            .json(&json!({ "tool": tool, "args": args }));
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let res = match request.send().await {
            Ok(res) => res,
            Err(e) => {
                let latency_ms = elapsed_ms(started);
                debug!("Gateway tool {} transport error after {}ms: {}", tool, latency_ms, e);
                return InvokeOutcome::Failure {
                    error: GatewayError::Transport(e.to_string()),
                    latency_ms: Some(latency_ms),
                };
            }
        };

        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        let payload: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let latency_ms = elapsed_ms(started);

        if !status.is_success() {
            let message = payload_error_message(&payload).unwrap_or_else(|| status_line(status));
            debug!("Gateway tool {} failed with {} after {}ms: {}", tool, status, latency_ms, message);
            return InvokeOutcome::Failure {
                error: GatewayError::Http {
                    status: status.as_u16(),
                    message,
                },
                latency_ms: Some(latency_ms),
            };
        }

        debug!("Gateway tool {} answered {} in {}ms", tool, status, latency_ms);
        InvokeOutcome::Success {
            result: unwrap_envelope(payload),
            latency_ms,
            status: status.as_u16(),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}

/// `error` wins over `message`; an `error` object contributes its own
/// `message`.
pub fn payload_error_message(payload: &Value) -> Option<String> {
    let from_error = match payload.get("error") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    from_error.or_else(|| {
        payload
            .get("message")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}

/// Peels the gateway's `{ok, result}` wrapper, then the tool-result
/// `{content: [{text: "<json>"}]}` wrapper when its text parses as JSON.
pub fn unwrap_envelope(payload: Value) -> Value {
    let inner = match payload {
        Value::Object(mut map)
            if map.get("ok").is_some_and(Value::is_boolean) && map.contains_key("result") =>
        {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    };
    unwrap_content_text(inner)
}

fn unwrap_content_text(payload: Value) -> Value {
    let parsed = payload
        .get("content")
        .and_then(Value::as_array)
        .and_then(|content| content.first())
        .and_then(|first| first.get("text"))
        .and_then(Value::as_str)
        .and_then(|text| serde_json::from_str::<Value>(text).ok());
    parsed.unwrap_or(payload)
}

/// An error reported inside an otherwise successful tool result.
pub fn embedded_error(result: &Value) -> Option<String> {
    if result.get("ok") == Some(&Value::Bool(false)) {
        return Some(payload_error_message(result).unwrap_or_else(|| "tool reported failure".to_string()));
    }
    match result.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(_) => Some(payload_error_message(result).unwrap_or_else(|| "tool reported an error".to_string())),
    }
}
