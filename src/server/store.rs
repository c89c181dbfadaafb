use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::models::{CheckOutcome, CheckStatus};

/// Check counters for one path since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningStats {
    pub total: u64,
    pub alive: u64,
}

impl RunningStats {
    pub fn uptime_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.alive as f64 / self.total as f64 * 100.0
        }
    }
}

/// Aggregate over every stored outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: usize,
    pub alive: usize,
    pub dead: usize,
    pub pending: usize,
    pub uptime_percent: f64,
    /// Mean over outcomes that have a duration, 0 when none do.
    pub average_duration_ms: f64,
    /// Most recent completion time among all outcomes.
    pub last_update: Option<DateTime<Utc>>,
}

/// Overall health across all checks, as reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    NoServices,
    Degraded,
    Checking,
    Healthy,
}

/// Last outcome per check path plus running counters. Safe to share between
/// overlapping ticks.
#[derive(Debug, Default)]
pub struct ResultStore {
    results: DashMap<String, CheckOutcome>,
    stats: DashMap<String, RunningStats>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the outcome stored under its path.
    pub fn upsert(&self, outcome: CheckOutcome) {
        self.results.insert(outcome.path.clone(), outcome);
    }

    /// Counts one more check for `path` and returns the updated counters.
    pub fn record_stats(&self, path: &str, alive: bool) -> RunningStats {
        let mut entry = self.stats.entry(path.to_string()).or_default();
        entry.total += 1;
        if alive {
            entry.alive += 1;
        }
        *entry
    }

    pub fn stats(&self, path: &str) -> Option<RunningStats> {
        self.stats.get(path).map(|s| *s)
    }

    pub fn get(&self, path: &str) -> Option<CheckOutcome> {
        self.results.get(path).map(|r| r.value().clone())
    }

    /// Every stored outcome, ordered by service id.
    pub fn all(&self) -> Vec<CheckOutcome> {
        let mut outcomes: Vec<CheckOutcome> =
            self.results.iter().map(|r| r.value().clone()).collect();
        outcomes.sort_by(|a, b| (&a.service_id, &a.path).cmp(&(&b.service_id, &b.path)));
        outcomes
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// `None` when nothing has been recorded yet.
    pub fn summary(&self) -> Option<Summary> {
        summarize(&self.all())
    }

    pub fn overall_status(&self) -> OverallStatus {
        overall_status(&self.all())
    }
}

pub fn summarize(outcomes: &[CheckOutcome]) -> Option<Summary> {
    if outcomes.is_empty() {
        return None;
    }
    let count = |status: CheckStatus| outcomes.iter().filter(|o| o.status == status).count();
    let total = outcomes.len();
    let alive = count(CheckStatus::Alive);
    let durations: Vec<f64> = outcomes.iter().filter_map(CheckOutcome::duration_ms).collect();
    let average_duration_ms = if durations.is_empty() {
        0.0
    } else {
        round2(durations.iter().sum::<f64>() / durations.len() as f64)
    };
    Some(Summary {
        total,
        alive,
        dead: count(CheckStatus::Dead),
        pending: count(CheckStatus::Pending),
        uptime_percent: round2(alive as f64 / total as f64 * 100.0),
        average_duration_ms,
        last_update: outcomes.iter().filter_map(|o| o.last_check).max(),
    })
}

pub fn overall_status(outcomes: &[CheckOutcome]) -> OverallStatus {
    if outcomes.is_empty() {
        OverallStatus::NoServices
    } else if outcomes.iter().any(|o| o.status == CheckStatus::Dead) {
        OverallStatus::Degraded
    } else if outcomes.iter().any(|o| o.status == CheckStatus::Pending) {
        OverallStatus::Checking
    } else {
        OverallStatus::Healthy
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
