pub mod health_routes;
pub mod metrics_routes;
