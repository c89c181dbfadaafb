//! Prometheus export of check results.

use prometheus::{CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use crate::models::CheckOutcome;
use crate::server::store::RunningStats;

const ITEM_LABELS: [&str; 4] = ["proto", "name", "id", "path"];
const COUNTER_LABELS: [&str; 5] = ["proto", "name", "id", "path", "status"];

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("Metrics output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Receives every stored outcome. Failures are reported to the caller, who
/// logs them; they never change the outcome.
pub trait MetricsSink: Send + Sync {
    fn record(&self, outcome: &CheckOutcome, stats: RunningStats) -> Result<(), MetricsError>;

    fn set_item_count(&self, count: usize) -> Result<(), MetricsError>;
}

/// The check metrics on a dedicated registry.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    item_status: GaugeVec,
    item_last_duration: GaugeVec,
    item_last_check_date: GaugeVec,
    checks_total: CounterVec,
    uptime_percent: GaugeVec,
    executable_item_count: Gauge,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let item_status = GaugeVec::new(
            Opts::new(
                "webdoctor_item_status",
                "Status of the item (-1 = pending, 0 = dead, 1 = alive)",
            ),
            &ITEM_LABELS,
        )?;
        registry.register(Box::new(item_status.clone()))?;

        let item_last_duration = GaugeVec::new(
            Opts::new("webdoctor_item_last_duration", "Last duration of the item"),
            &ITEM_LABELS,
        )?;
        registry.register(Box::new(item_last_duration.clone()))?;

        let item_last_check_date = GaugeVec::new(
            Opts::new("webdoctor_item_last_check_date", "Last check date of the item"),
            &ITEM_LABELS,
        )?;
        registry.register(Box::new(item_last_check_date.clone()))?;

        let checks_total = CounterVec::new(
            Opts::new("webdoctor_checks_total", "Total number of checks performed"),
            &COUNTER_LABELS,
        )?;
        registry.register(Box::new(checks_total.clone()))?;

        let uptime_percent = GaugeVec::new(
            Opts::new(
                "webdoctor_service_uptime_percent",
                "Uptime percentage for service",
            ),
            &ITEM_LABELS,
        )?;
        registry.register(Box::new(uptime_percent.clone()))?;

        let executable_item_count =
            Gauge::with_opts(Opts::new("webdoctor_executable_item_count", "Number of items"))?;
        registry.register(Box::new(executable_item_count.clone()))?;

        Ok(Self {
            registry,
            item_status,
            item_last_duration,
            item_last_check_date,
            checks_total,
            uptime_percent,
            executable_item_count,
        })
    }

    /// Text exposition format of every registered metric.
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record(&self, outcome: &CheckOutcome, stats: RunningStats) -> Result<(), MetricsError> {
        let labels = [
            outcome.protocol.as_str(),
            outcome.name.as_str(),
            outcome.path.as_str(),
            outcome.full_http_path.as_str(),
        ];
        self.item_status
            .get_metric_with_label_values(&labels)?
            .set(outcome.status.as_gauge());
        if let Some(ms) = outcome.duration_ms() {
            self.item_last_duration
                .get_metric_with_label_values(&labels)?
                .set(ms);
        }
        if let Some(at) = outcome.last_check {
            self.item_last_check_date
                .get_metric_with_label_values(&labels)?
                .set(at.timestamp_millis() as f64);
        }

        let [proto, name, id, path] = labels;
        self.checks_total
            .get_metric_with_label_values(&[proto, name, id, path, outcome.status.as_str()])?
            .inc();

        if stats.total > 0 {
            self.uptime_percent
                .get_metric_with_label_values(&labels)?
                .set(stats.uptime_percent());
        }
        Ok(())
    }

    fn set_item_count(&self, count: usize) -> Result<(), MetricsError> {
        self.executable_item_count.set(count as f64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceNode;
    use std::time::Duration;

    fn outcome() -> CheckOutcome {
        let mut node = ServiceNode::new("api.users");
        node.protocol = "https".into();
        node.name = Some("Users".into());
        let mut outcome =
            CheckOutcome::pending(&node, "api.users").alive(Duration::from_millis(42));
        outcome.full_http_path = "/api/users".into();
        outcome
    }

    #[test]
    fn records_labelled_series() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics
            .record(&outcome(), RunningStats { total: 4, alive: 3 })
            .unwrap();
        metrics.set_item_count(7).unwrap();

        let text = metrics.render().unwrap();
        let labels = r#"id="api.users",name="Users",path="/api/users",proto="https""#;
        assert!(text.contains(&format!("webdoctor_item_status{{{labels}}} 1")));
        assert!(text.contains(&format!("webdoctor_item_last_duration{{{labels}}} 42")));
        assert!(text.contains(&format!("webdoctor_service_uptime_percent{{{labels}}} 75")));
        assert!(text.contains(&format!(
            "webdoctor_checks_total{{{labels},status=\"alive\"}} 1"
        )));
        assert!(text.contains("webdoctor_executable_item_count 7"));
    }

    #[test]
    fn registries_are_independent() {
        let a = PrometheusMetrics::new().unwrap();
        let b = PrometheusMetrics::new().unwrap();
        a.set_item_count(1).unwrap();
        assert!(b.render().unwrap().contains("webdoctor_executable_item_count 0"));
    }
}
