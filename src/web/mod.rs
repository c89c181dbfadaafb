use axum::{Router, http::Method, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::server::{PrometheusMetrics, ResultBroadcaster, ResultStore};

pub mod error;
pub mod models;
pub mod routes;
pub mod websocket_handler;

pub use error::AppError;

use routes::{health_routes, metrics_routes};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ResultStore>,
    pub broadcaster: Arc<ResultBroadcaster>,
    pub metrics: Arc<PrometheusMetrics>,
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .merge(health_routes::health_router())
        .merge(metrics_routes::metrics_router())
        .route("/ws", get(websocket_handler::websocket_handler))
        .with_state(app_state)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckOutcome, ServiceNode};
    use crate::server::{MetricsSink, RunningStats};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            store: Arc::new(ResultStore::new()),
            broadcaster: Arc::new(ResultBroadcaster::with_capacity(8)),
            metrics: Arc::new(PrometheusMetrics::new().unwrap()),
        })
    }

    fn store_outcome(state: &AppState, path: &str, alive: bool) -> CheckOutcome {
        let mut node = ServiceNode::new(path);
        node.protocol = "http".into();
        node.host = "example.com".into();
        let pending = CheckOutcome::pending(&node, path);
        let mut outcome = if alive {
            pending.alive(Duration::from_millis(20))
        } else {
            pending.dead(Duration::from_millis(40), "HTTP 503 Service Unavailable")
        };
        outcome.full_http_path = "/status".into();
        state.store.upsert(outcome.clone());
        outcome
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let response = create_axum_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn self_health_is_always_healthy() {
        let (status, body) = get_json(state(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn empty_store_reports_no_services() {
        let (_, overall) = get_json(state(), "/api/health").await;
        assert_eq!(overall["status"], "no_services");
        assert_eq!(overall["services"]["total"], 0);

        let (status, summary) = get_json(state(), "/api/health/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["total"], 0);
        assert_eq!(summary["message"], "No services configured");
    }

    #[tokio::test]
    async fn summary_and_overall_status_reflect_outcomes() {
        let state = state();
        store_outcome(&state, "api.users", true);
        store_outcome(&state, "api.orders", false);

        let (_, overall) = get_json(state.clone(), "/api/health").await;
        assert_eq!(overall["status"], "degraded");
        assert_eq!(overall["services"]["dead"], 1);

        let (_, summary) = get_json(state, "/api/health/summary").await;
        assert_eq!(summary["total"], 2);
        assert_eq!(summary["uptimePercent"], 50.0);
        assert_eq!(summary["averageDurationMs"], 30.0);
        assert!(summary["lastUpdate"].is_string());
    }

    #[tokio::test]
    async fn services_are_listed_and_found_by_path() {
        let state = state();
        store_outcome(&state, "web.b", true);
        store_outcome(&state, "web.a", true);

        let (_, list) = get_json(state.clone(), "/api/health/services").await;
        assert_eq!(list["count"], 2);
        assert_eq!(list["services"][0]["serviceId"], "web.a");

        let (status, one) = get_json(state.clone(), "/api/health/services/web.b").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(one["fullHttpPath"], "/status");
        assert_eq!(one["status"], "alive");

        let (status, missing) = get_json(state, "/api/health/services/nope/deeper").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing["error"], "Service not found");
        assert_eq!(missing["path"], "nope/deeper");
    }

    #[tokio::test]
    async fn metrics_are_exposed_as_text() {
        let state = state();
        let outcome = store_outcome(&state, "web", true);
        state
            .metrics
            .record(&outcome, RunningStats { total: 1, alive: 1 })
            .unwrap();

        let response = create_axum_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[axum::http::header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("webdoctor_item_status{"));
        assert!(text.contains("webdoctor_checks_total{"));
    }
}
