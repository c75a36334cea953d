use axum::{Json, extract::State};
use chrono::Utc;

use super::super::AppState;
use crate::core::telemetry::aggregate::background_feed;
use crate::core::telemetry::types::BackgroundFeed;

pub async fn background_endpoint(State(state): State<AppState>) -> Json<BackgroundFeed> {
    Json(background_feed(state.gateway.as_ref(), &state.config, Utc::now()).await)
}
