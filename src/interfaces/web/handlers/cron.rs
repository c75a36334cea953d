use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::super::AppState;
use super::{ApiError, bad_request};
use crate::core::telemetry::aggregate::rerun_cron_job;
use crate::core::telemetry::coerce::pick_string;

pub async fn rerun_cron_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let Some(job_id) = pick_string(&payload, &["jobId", "job_id"]) else {
        return Err(bad_request("jobId is required"));
    };
    let job_id = job_id.trim().to_string();

    if !state.gateway.is_configured() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "jobId": job_id,
                "error": "Gateway URL is not configured",
                "attempted": [],
            })),
        ));
    }

    match rerun_cron_job(state.gateway.as_ref(), &job_id).await {
        Ok(found) => {
            info!("Cron job {} re-run via {}", job_id, found.source);
            Ok(Json(json!({
                "success": true,
                "jobId": job_id,
                "tool": found.source,
                "result": found.result,
            })))
        }
        Err(exhausted) => {
            warn!("Cron job {} re-run failed: {}", job_id, exhausted);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "jobId": job_id,
                    "error": format!("No cron run tool succeeded ({})", exhausted),
                    "attempted": exhausted.attempted,
                })),
            ))
        }
    }
}
