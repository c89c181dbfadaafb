pub mod config_source;
pub mod engine;
pub mod metrics;
pub mod result_broadcaster;
pub mod route;
pub mod settings;
pub mod store;

pub use engine::HealthCheckEngine;
pub use metrics::{MetricsError, MetricsSink, PrometheusMetrics};
pub use result_broadcaster::{PushChannel, PushError, ResultBroadcaster};
pub use settings::{ServerSettings, SettingsError};
pub use store::{OverallStatus, ResultStore, RunningStats, Summary};
