use axum::{Json, extract::State};
use serde_json::json;

use super::super::AppState;

pub async fn health_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "gatewayConfigured": state.gateway.is_configured(),
        "risk": {
            "level": state.config.risk_level,
            "note": state.config.risk_note,
        }
    }))
}
