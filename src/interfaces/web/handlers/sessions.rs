use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde_json::json;

use super::super::AppState;
use super::{ApiError, unavailable};
use crate::core::telemetry::aggregate::{fetch_sessions, fetch_terminal};
use crate::core::telemetry::types::GatewayStatus;

pub async fn list_sessions_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let listed = fetch_sessions(state.gateway.as_ref(), &state.config).await;
    if !listed.gateway.available {
        return Err(unavailable(&listed.gateway, json!({ "sessions": [] })));
    }
    Ok(Json(json!({
        "success": true,
        "available": true,
        "gateway": listed.gateway,
        "sessions": listed.sessions,
    })))
}

#[derive(serde::Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

pub async fn session_history_endpoint(
    Path(key): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(state.config.history_limit).max(1);
    match fetch_terminal(state.gateway.as_ref(), &key, limit, Utc::now()).await {
        Ok(items) => Ok(Json(json!({
            "success": true,
            "sessionKey": key,
            "terminal": items,
        }))),
        Err(error) => {
            let gateway = GatewayStatus {
                configured: state.gateway.is_configured(),
                available: false,
                latency_ms: None,
                error: Some(error),
            };
            Err(unavailable(
                &gateway,
                json!({ "sessionKey": key, "terminal": [] }),
            ))
        }
    }
}
