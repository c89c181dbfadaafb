use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::models::ServiceNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Dead,
    Alive,
}

impl CheckStatus {
    /// Numeric form exported as the status gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            CheckStatus::Pending => -1.0,
            CheckStatus::Dead => 0.0,
            CheckStatus::Alive => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pending => "pending",
            CheckStatus::Dead => "dead",
            CheckStatus::Alive => "alive",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one scheduled check of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub service_id: String,
    /// Dotted check path; the key of the result store.
    pub path: String,
    /// URL-style route assembled from the ancestor chain.
    pub full_http_path: String,
    pub protocol: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Query text for SQL nodes, command text for SSH nodes.
    pub additional_info: Option<String>,
    pub status: CheckStatus,
    pub duration: Option<Duration>,
    pub last_check: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl CheckOutcome {
    /// A pending outcome for `node` at `path`, ready for a checker to fill in.
    pub fn pending(node: &ServiceNode, path: &str) -> Self {
        Self {
            service_id: node.id.clone(),
            path: path.to_string(),
            full_http_path: String::new(),
            protocol: node.protocol.clone(),
            name: node.display_name().to_string(),
            host: node.host.clone(),
            port: node.port,
            additional_info: None,
            status: CheckStatus::Pending,
            duration: None,
            last_check: None,
            error: None,
        }
    }

    pub fn alive(mut self, elapsed: Duration) -> Self {
        self.finish(CheckStatus::Alive, elapsed, None);
        self
    }

    pub fn dead(mut self, elapsed: Duration, error: impl Into<String>) -> Self {
        self.finish(CheckStatus::Dead, elapsed, Some(error.into()));
        self
    }

    fn finish(&mut self, status: CheckStatus, elapsed: Duration, error: Option<String>) {
        self.status = status;
        self.duration = Some(elapsed);
        self.last_check = Some(Utc::now());
        self.error = error;
    }

    pub fn is_alive(&self) -> bool {
        self.status == CheckStatus::Alive
    }

    pub fn duration_ms(&self) -> Option<f64> {
        self.duration.map(|d| d.as_secs_f64() * 1000.0)
    }
}
