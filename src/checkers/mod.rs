use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::models::{CheckOutcome, ServiceNode};

pub mod http;
pub mod sql;
pub mod ssh;
pub mod tcp;
pub mod udp;

pub use http::HttpChecker;
pub use sql::SqlChecker;
pub use ssh::SshChecker;
pub use tcp::TcpChecker;
pub use udp::UdpChecker;

/// Timeout applied when a node declares none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a node sits in the tree, computed by the scheduler before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTarget {
    /// Dotted check path, the result store key.
    pub path: String,
    /// URL-style route assembled from the ancestor chain.
    pub route: String,
}

/// Why a single probe failed. Only ever surfaces as the `error` text of a
/// dead outcome.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Connection timeout")]
    ConnectTimeout,
    #[error("Request timed out")]
    RequestTimeout,
    #[error("Could not resolve host {0}")]
    Resolve(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Http(reqwest::Error),
    #[error("{0}")]
    Sql(#[from] sqlx::Error),
    #[error("{0}")]
    Mismatch(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::RequestTimeout
        } else {
            ProbeError::Http(err)
        }
    }
}

/// A protocol handler.
///
/// `check` never fails: every problem is reported as a dead outcome, and
/// the outcome always carries the elapsed time and completion timestamp.
#[async_trait]
pub trait Checker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Case-insensitive match against the protocols this checker handles.
    fn supports(&self, protocol: &str) -> bool;

    async fn check(&self, node: &ServiceNode, target: &CheckTarget) -> CheckOutcome;
}

/// The built-in protocol handlers.
pub enum ProtocolChecker {
    Http(HttpChecker),
    Tcp(TcpChecker),
    Udp(UdpChecker),
    Sql(SqlChecker),
    Ssh(SshChecker),
}

impl ProtocolChecker {
    pub fn protocols(&self) -> &'static [&'static str] {
        match self {
            ProtocolChecker::Http(_) => &["http", "https"],
            ProtocolChecker::Tcp(_) => &["tcp"],
            ProtocolChecker::Udp(_) => &["udp"],
            ProtocolChecker::Sql(_) => &["mysql", "postgresql", "postgres"],
            ProtocolChecker::Ssh(_) => &["ssh"],
        }
    }
}

#[async_trait]
impl Checker for ProtocolChecker {
    fn name(&self) -> &'static str {
        match self {
            ProtocolChecker::Http(_) => "http",
            ProtocolChecker::Tcp(_) => "tcp",
            ProtocolChecker::Udp(_) => "udp",
            ProtocolChecker::Sql(_) => "sql",
            ProtocolChecker::Ssh(_) => "ssh",
        }
    }

    fn supports(&self, protocol: &str) -> bool {
        self.protocols()
            .iter()
            .any(|p| p.eq_ignore_ascii_case(protocol))
    }

    async fn check(&self, node: &ServiceNode, target: &CheckTarget) -> CheckOutcome {
        match self {
            ProtocolChecker::Http(c) => measured(node, target, c.probe(node, target)).await,
            ProtocolChecker::Tcp(c) => measured(node, target, c.probe(node)).await,
            ProtocolChecker::Udp(c) => measured(node, target, c.probe(node)).await,
            ProtocolChecker::Sql(c) => measured(node, target, c.probe(node)).await,
            ProtocolChecker::Ssh(c) => measured(node, target, c.probe(node)).await,
        }
    }
}

/// Runs `probe` and turns its result into a stamped outcome.
pub async fn measured<F>(node: &ServiceNode, target: &CheckTarget, probe: F) -> CheckOutcome
where
    F: Future<Output = Result<(), ProbeError>>,
{
    let started = Instant::now();
    let result = probe.await;
    let outcome = CheckOutcome::pending(node, &target.path);
    match result {
        Ok(()) => outcome.alive(started.elapsed()),
        Err(e) => outcome.dead(started.elapsed(), e.to_string()),
    }
}

pub(crate) fn effective_timeout(node: &ServiceNode) -> Duration {
    node.timeout.unwrap_or(DEFAULT_TIMEOUT)
}

/// Ordered set of checkers. Resolution picks the first one that supports
/// the protocol.
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    checkers: Vec<Arc<dyn Checker>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ProtocolChecker::Http(HttpChecker::new())));
        registry.register(Arc::new(ProtocolChecker::Sql(SqlChecker::new())));
        registry.register(Arc::new(ProtocolChecker::Ssh(SshChecker)));
        registry.register(Arc::new(ProtocolChecker::Tcp(TcpChecker)));
        registry.register(Arc::new(ProtocolChecker::Udp(UdpChecker)));
        registry
    }

    pub fn register(&mut self, checker: Arc<dyn Checker>) {
        self.checkers.push(checker);
    }

    pub fn resolve(&self, protocol: &str) -> Option<Arc<dyn Checker>> {
        self.checkers
            .iter()
            .find(|c| c.supports(protocol))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}
