pub mod background;
pub mod cron;
pub mod health;
pub mod sessions;
pub mod telemetry;

use axum::{Json, http::StatusCode};
use serde_json::{Value, json};

use crate::core::telemetry::types::GatewayStatus;

pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
}

/// 503 body shared by every gateway-backed route that cannot answer.
pub(crate) fn unavailable(gateway: &GatewayStatus, extra: Value) -> ApiError {
    let mut body = json!({
        "success": false,
        "available": false,
        "gateway": gateway,
        "error": gateway.error.clone().unwrap_or_else(|| "Gateway unavailable".to_string()),
    });
    if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    (StatusCode::SERVICE_UNAVAILABLE, Json(body))
}
