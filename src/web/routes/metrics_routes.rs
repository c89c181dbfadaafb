use axum::{
    Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;

use crate::web::AppError;
use crate::web::AppState;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

async fn prometheus_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let body = app_state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, TEXT_FORMAT)], body))
}

pub fn metrics_router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(prometheus_handler))
}
