use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::server::MetricsError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Service not found")]
    ServiceNotFound { path: String },
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::ServiceNotFound { path } => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Service not found", "path": path })),
            )
                .into_response(),
            AppError::Metrics(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Metrics error: {e}") })),
            )
                .into_response(),
        }
    }
}
