use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::server::store::{overall_status, summarize};
use crate::web::AppError;
use crate::web::AppState;
use crate::web::models::{AllStatusesPush, OutcomeDto};

/// Liveness of the process itself.
async fn self_health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "timestamp": Utc::now() }))
}

async fn overall_health_handler(State(app_state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let outcomes = app_state.store.all();
    let summary = summarize(&outcomes);
    let (alive, dead, pending) = summary
        .as_ref()
        .map_or((0, 0, 0), |s| (s.alive, s.dead, s.pending));
    Json(json!({
        "status": overall_status(&outcomes),
        "timestamp": Utc::now(),
        "services": {
            "total": outcomes.len(),
            "alive": alive,
            "dead": dead,
            "pending": pending,
        }
    }))
}

async fn list_services_handler(State(app_state): State<Arc<AppState>>) -> Json<AllStatusesPush> {
    Json(AllStatusesPush::from_outcomes(&app_state.store.all()))
}

async fn get_service_handler(
    State(app_state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<OutcomeDto>, AppError> {
    app_state
        .store
        .get(&path)
        .map(|outcome| Json(OutcomeDto::from(&outcome)))
        .ok_or(AppError::ServiceNotFound { path })
}

async fn summary_handler(State(app_state): State<Arc<AppState>>) -> Response {
    match app_state.store.summary() {
        Some(summary) => Json(summary).into_response(),
        None => Json(json!({ "total": 0, "message": "No services configured" })).into_response(),
    }
}

pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(self_health_handler))
        .route("/api/health", get(overall_health_handler))
        .route("/api/health/services", get(list_services_handler))
        .route("/api/health/services/{*path}", get(get_service_handler))
        .route("/api/health/summary", get(summary_handler))
}
