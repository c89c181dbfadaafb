use serde_json::{Map, Value};
use std::time::Duration;

/// One row of a canned SQL result: column name to loosely-typed value.
pub type DataRow = Map<String, Value>;

/// Root of a parsed health-check configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Global check interval. `None` means the engine default (60 s).
    pub interval: Option<Duration>,
    pub services: Vec<ServiceNode>,
}

/// A node of the service tree, produced identically by both config dialects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceNode {
    /// Dotted hierarchical path, unique within a parse.
    pub id: String,
    pub name: Option<String>,
    /// Empty means the node has nothing to probe.
    pub protocol: String,
    pub host: String,
    /// `0` means unset and is replaced by an ancestor's port during inheritance.
    pub port: u16,
    pub timeout: Option<Duration>,
    pub interval: Option<Duration>,
    pub retry_count: Option<u32>,
    pub retry_delay: Option<Duration>,

    // HTTP
    pub method: Option<String>,
    pub path: Option<String>,
    pub path_is_prefix: bool,

    // SQL
    pub query: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,

    // SSH
    pub command: Option<String>,

    pub response: Option<ResponseExpectation>,
    pub children: Vec<ServiceNode>,
    pub excludes: Vec<ExcludeRule>,
}

impl ServiceNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Label shown to users: the explicit name, else the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn response_mut(&mut self) -> &mut ResponseExpectation {
        self.response.get_or_insert_with(ResponseExpectation::default)
    }

    /// Fills every unset inheritable field (`host`, `port`, `protocol`,
    /// `timeout`, `method`) from `parent`. Already-set fields are untouched,
    /// so applying it twice is a no-op.
    pub fn inherit_from(&mut self, parent: &InheritedFields) {
        if self.host.is_empty() {
            self.host = parent.host.clone();
        }
        if self.port == 0 {
            self.port = parent.port;
        }
        if self.protocol.is_empty() {
            self.protocol = parent.protocol.clone();
        }
        if self.timeout.is_none() {
            self.timeout = parent.timeout;
        }
        if self.method.as_ref().map_or(true, |m| m.is_empty()) {
            self.method = parent.method.clone();
        }
    }

    /// Copy of this node with its subtree dropped; what a single check needs.
    pub fn detached(&self) -> ServiceNode {
        ServiceNode {
            children: Vec::new(),
            ..self.clone()
        }
    }
}

/// Snapshot of the fields a node passes down to its children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InheritedFields {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub timeout: Option<Duration>,
    pub method: Option<String>,
}

impl From<&ServiceNode> for InheritedFields {
    fn from(node: &ServiceNode) -> Self {
        Self {
            host: node.host.clone(),
            port: node.port,
            protocol: node.protocol.clone(),
            timeout: node.timeout,
            method: node.method.clone(),
        }
    }
}

/// Per-node success criteria. Every field is optional; checkers only
/// validate what is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseExpectation {
    // HTTP
    pub status: Option<u16>,
    pub body_contains: Option<String>,
    pub body_regex: Option<String>,

    // SQL
    pub rows: Option<i64>,
    pub columns: Option<i64>,
    pub data: Option<Vec<DataRow>>,

    // SSH
    pub exit_code: Option<i32>,
}

/// Filter owned by a container node: matching descendants are not checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExcludeRule {
    pub path: Option<String>,
    pub path_is_prefix: bool,
}

impl ExcludeRule {
    /// Compares against a node's own `path`, never its full route.
    pub fn matches(&self, node_path: Option<&str>) -> bool {
        match (self.path.as_deref(), node_path) {
            (Some(rule), Some(path)) if self.path_is_prefix => path.starts_with(rule),
            (Some(rule), Some(path)) => path == rule,
            _ => false,
        }
    }
}
