use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{background, cron, health, sessions, telemetry};

/// The dashboard is served from localhost only; common dev-server ports are
/// allowed alongside the API's own origin.
fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [api_port, 3000, 5173]
        .iter()
        .flat_map(|port| {
            [
                format!("http://127.0.0.1:{}", port),
                format!("http://localhost:{}", port),
            ]
        })
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health_endpoint))
        .route("/api/sessions", get(sessions::list_sessions_endpoint))
        .route(
            "/api/sessions/{key}/history",
            get(sessions::session_history_endpoint),
        )
        .route("/api/telemetry", get(telemetry::telemetry_endpoint))
        .route("/api/background", get(background::background_endpoint))
        .route("/api/cron/rerun", post(cron::rerun_cron_endpoint))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.config.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'; frame-ancestors 'none'"),
    );
    // Telemetry is live data; never serve it from a cache.
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DashboardConfig;
    use crate::core::gateway::ToolInvoker;
    use crate::core::telemetry::aggregate::testing::ScriptedInvoker;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn state_with(invoker: ScriptedInvoker) -> AppState {
        let (log_tx, _) = tokio::sync::broadcast::channel(16);
        let gateway: Arc<dyn ToolInvoker> = Arc::new(invoker);
        AppState {
            config: Arc::new(DashboardConfig {
                risk_level: Some("elevated".to_string()),
                ..DashboardConfig::default()
            }),
            gateway,
            log_tx,
        }
    }

    fn empty_state() -> AppState {
        state_with(ScriptedInvoker::unconfigured())
    }

    async fn json_request(
        app: Router,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let body = match body {
            Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
            None => Body::empty(),
        };

        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body_bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&body_bytes).unwrap_or(serde_json::json!({}));
        (status, json)
    }

    #[tokio::test]
    async fn security_headers_present_on_responses() {
        let app = build_api_router(empty_state());

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(resp.headers().get("cache-control").unwrap(), "no-store");
        assert!(
            resp.headers()
                .get("content-security-policy")
                .unwrap()
                .to_str()
                .unwrap()
                .contains("default-src 'self'")
        );
    }

    #[tokio::test]
    async fn health_reports_config_without_gateway() {
        let app = build_api_router(empty_state());
        let (status, json) = json_request(app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["gatewayConfigured"], false);
        assert_eq!(json["risk"]["level"], "elevated");
    }

    #[tokio::test]
    async fn telemetry_is_ok_and_empty_when_unconfigured() {
        let app = build_api_router(empty_state());
        let (status, json) = json_request(app, Method::GET, "/api/telemetry", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["gateway"]["available"], false);
        for key in [
            "sessions", "terminal", "processes", "cronJobs", "cronRuns", "queues", "events",
            "usage",
        ] {
            assert_eq!(json[key], json!([]), "{key} should be an empty array");
        }
        assert!(!json["warnings"].as_array().unwrap().is_empty());
        assert_eq!(json["risk"]["level"], "elevated");
    }

    #[tokio::test]
    async fn sessions_unavailable_returns_503() {
        let app = build_api_router(empty_state());
        let (status, json) = json_request(app, Method::GET, "/api/sessions", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["available"], false);
        assert_eq!(json["sessions"], json!([]));
    }

    #[tokio::test]
    async fn sessions_list_normalizes_gateway_rows() {
        let invoker = ScriptedInvoker::new().respond(
            "sessions_list",
            json!({"sessions": [{"sessionKey": "agent:main:main", "totalTokens": "1200"}]}),
        );
        let app = build_api_router(state_with(invoker));
        let (status, json) = json_request(app, Method::GET, "/api/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sessions"][0]["key"], "agent:main:main");
        assert_eq!(json["sessions"][0]["totalTokens"], 1200);
        assert_eq!(json["gateway"]["available"], true);
    }

    #[tokio::test]
    async fn session_history_maps_terminal_items() {
        let invoker = ScriptedInvoker::new().respond(
            "sessions_history",
            json!({"messages": [{"role": "system", "content": "compacted", "timestamp": "2024-01-01T00:00:00Z"}]}),
        );
        let app = build_api_router(state_with(invoker));
        let (status, json) = json_request(
            app,
            Method::GET,
            "/api/sessions/agent:main:main/history?limit=5",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["terminal"][0]["type"], "system");
        assert_eq!(
            json["terminal"][0]["id"],
            "agent:main:main:2024-01-01T00:00:00.000Z:0"
        );
    }

    #[tokio::test]
    async fn session_history_failure_returns_503() {
        let app = build_api_router(state_with(ScriptedInvoker::new()));
        let (status, json) =
            json_request(app, Method::GET, "/api/sessions/x/history", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["terminal"], json!([]));
    }

    #[tokio::test]
    async fn background_is_ok_with_warnings() {
        let app = build_api_router(state_with(ScriptedInvoker::new()));
        let (status, json) = json_request(app, Method::GET, "/api/background", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["processes"], json!([]));
        assert_eq!(json["warnings"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cron_rerun_requires_job_id() {
        let app = build_api_router(state_with(ScriptedInvoker::new()));
        let (status, json) =
            json_request(app, Method::POST, "/api/cron/rerun", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn cron_rerun_uses_first_working_tool() {
        let invoker = ScriptedInvoker::new().respond("cron_run", json!({"queued": true}));
        let app = build_api_router(state_with(invoker));
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/cron/rerun",
            Some(json!({"jobId": "nightly"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tool"], "cron_run");
        assert_eq!(json["result"]["queued"], true);
    }

    #[tokio::test]
    async fn cron_rerun_without_tools_returns_503_with_attempts() {
        let app = build_api_router(state_with(ScriptedInvoker::new()));
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/cron/rerun",
            Some(json!({"jobId": "nightly"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            json["attempted"],
            json!(["cron(run)", "cron_run", "cron_trigger"])
        );
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let app = build_api_router(empty_state());
        let (status, _) = json_request(app, Method::GET, "/api/agents", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
