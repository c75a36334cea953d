use axum::{Json, extract::State};
use chrono::Utc;

use super::super::AppState;
use crate::core::telemetry::aggregate::build_snapshot;
use crate::core::telemetry::types::TelemetryResponse;

/// Always 200. Missing pieces are reported in `warnings`.
pub async fn telemetry_endpoint(State(state): State<AppState>) -> Json<TelemetryResponse> {
    Json(build_snapshot(state.gateway.as_ref(), &state.config, Utc::now()).await)
}
