use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::checkers::{CheckTarget, Checker, CheckerRegistry, effective_timeout};
use crate::models::{CheckOutcome, Config, ServiceNode};
use crate::parsers::lexical::DEFAULT_DURATION;
use crate::server::metrics::MetricsSink;
use crate::server::result_broadcaster::PushChannel;
use crate::server::route::{check_path, full_route, is_excluded};
use crate::server::store::ResultStore;

/// Pause between two attempts of the same check when none is configured.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Walks the whole service tree on every tick and checks each node
/// concurrently.
#[derive(Clone)]
pub struct HealthCheckEngine {
    config: Arc<Config>,
    registry: Arc<CheckerRegistry>,
    store: Arc<ResultStore>,
    metrics: Arc<dyn MetricsSink>,
    push: Arc<dyn PushChannel>,
}

impl HealthCheckEngine {
    pub fn new(
        config: Config,
        registry: CheckerRegistry,
        store: Arc<ResultStore>,
        metrics: Arc<dyn MetricsSink>,
        push: Arc<dyn PushChannel>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            store,
            metrics,
            push,
        }
    }

    pub fn interval(&self) -> Duration {
        match self.config.interval {
            Some(d) if !d.is_zero() => d,
            Some(_) => {
                warn!("Zero check interval configured, using the default");
                DEFAULT_DURATION
            }
            None => DEFAULT_DURATION,
        }
    }

    /// Ticks immediately, then once per interval, until `shutdown` flips to
    /// `true` or its sender is dropped. Ticks may overlap; in-flight ticks
    /// are abandoned on shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.interval();
        info!(
            interval_ms = interval.as_millis() as u64,
            services = self.config.services.len(),
            "Starting health check engine"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let engine = self.clone();
                    ticks.spawn(async move { engine.run_tick().await });
                }
                Some(finished) = ticks.join_next() => {
                    if let Err(e) = finished {
                        error!(error = %e, "Error performing health checks");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        ticks.abort_all();
        info!("Stopping health check engine");
    }

    /// One full pass over the tree. Returns how many outcomes were recorded.
    pub async fn run_tick(&self) -> usize {
        let mut tasks = JoinSet::new();
        let mut ancestors = Vec::new();
        for root in &self.config.services {
            self.dispatch(&mut tasks, root, &mut ancestors, None);
        }

        let mut recorded = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(_)) => recorded += 1,
                Ok(None) => {}
                Err(e) => error!(error = %e, "Check task failed"),
            }
        }

        if let Some(summary) = self.store.summary() {
            if let Err(e) = self.push.summary(&summary) {
                warn!(error = %e, "Failed to push summary update");
            }
        }
        recorded
    }

    fn dispatch<'a>(
        &self,
        tasks: &mut JoinSet<Option<CheckOutcome>>,
        node: &'a ServiceNode,
        ancestors: &mut Vec<&'a ServiceNode>,
        parent_path: Option<&str>,
    ) {
        let path = check_path(parent_path, node);
        if is_excluded(ancestors.last().copied(), node) {
            debug!(path = %path, "Skipping excluded node");
        } else {
            let target = CheckTarget {
                path: path.clone(),
                route: full_route(ancestors, node),
            };
            let engine = self.clone();
            let detached = node.detached();
            tasks.spawn(async move { engine.check_node(detached, target).await });
        }

        ancestors.push(node);
        for child in &node.children {
            self.dispatch(tasks, child, ancestors, Some(path.as_str()));
        }
        ancestors.pop();
    }

    /// Resolves a checker, runs it with retries and records the final
    /// outcome. `None` when no checker handles the node's protocol.
    pub async fn check_node(&self, node: ServiceNode, target: CheckTarget) -> Option<CheckOutcome> {
        let Some(checker) = self.registry.resolve(&node.protocol) else {
            warn!(protocol = %node.protocol, path = %target.path, "No checker found for protocol");
            return None;
        };

        let retries = node.retry_count.unwrap_or(0);
        let delay = node.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY);
        let mut attempt = 0;
        let mut outcome = loop {
            if attempt > 0 {
                debug!(attempt, path = %target.path, "Retrying check");
                sleep(delay).await;
            }
            let outcome = attempt_once(checker.as_ref(), &node, &target).await;
            if outcome.is_alive() || attempt >= retries {
                break outcome;
            }
            attempt += 1;
        };

        enrich(&mut outcome, &node, &target);
        self.record(&outcome);
        Some(outcome)
    }

    fn record(&self, outcome: &CheckOutcome) {
        self.store.upsert(outcome.clone());
        let stats = self.store.record_stats(&outcome.path, outcome.is_alive());

        if let Err(e) = self.metrics.record(outcome, stats) {
            warn!(path = %outcome.path, error = %e, "Failed to update metrics");
        }
        if let Err(e) = self.metrics.set_item_count(self.store.len()) {
            warn!(error = %e, "Failed to update item count");
        }
        if let Err(e) = self.push.status_update(outcome) {
            warn!(path = %outcome.path, error = %e, "Failed to push status update");
        }

        info!(
            path = %outcome.path,
            status = %outcome.status,
            duration_ms = outcome.duration_ms().unwrap_or(0.0),
            "Check completed"
        );
    }
}

async fn attempt_once(checker: &dyn Checker, node: &ServiceNode, target: &CheckTarget) -> CheckOutcome {
    let limit = effective_timeout(node);
    match timeout(limit, checker.check(node, target)).await {
        Ok(outcome) => outcome,
        Err(_) => CheckOutcome::pending(node, &target.path).dead(
            limit,
            format!("Check timed out after {}ms", limit.as_millis()),
        ),
    }
}

fn enrich(outcome: &mut CheckOutcome, node: &ServiceNode, target: &CheckTarget) {
    outcome.path = target.path.clone();
    outcome.full_http_path = target.route.clone();
    outcome.host = node.host.clone();
    outcome.port = node.port;
    outcome.additional_info = match node.protocol.to_ascii_lowercase().as_str() {
        "mysql" | "postgresql" | "postgres" => node.query.clone(),
        "ssh" => node.command.clone(),
        _ => None,
    };
}
