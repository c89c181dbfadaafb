pub mod attribute;
pub mod block;
pub mod error;
pub mod lexical;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use error::{ParseError, SyntaxError};

use crate::models::{Config, InheritedFields, ServiceNode};

/// Which concrete syntax a config text is written in. Chosen by deployment,
/// never sniffed from the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `.attr value` statements with `name { }`, `!name { }` and `-name { }` blocks.
    Attribute,
    /// `key = value` attributes with `group "x" { }` and `service "x" { }` blocks.
    #[default]
    Block,
}

impl Dialect {
    pub fn parse(self, input: &str) -> Result<Config, ParseError> {
        match self {
            Dialect::Attribute => attribute::parse(input),
            Dialect::Block => block::parse(input),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Attribute => "attribute",
            Dialect::Block => "block",
        })
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attribute" | "attr" => Ok(Dialect::Attribute),
            "block" | "hcl" => Ok(Dialect::Block),
            other => Err(format!("unknown config dialect `{other}` (expected `attribute` or `block`)")),
        }
    }
}

/// Pushes unset `host`, `port`, `protocol`, `timeout` and `method` values
/// from every node down to its descendants, nearest ancestor first.
/// Running it again changes nothing.
pub fn apply_inheritance(services: &mut [ServiceNode]) {
    for node in services {
        inherit_down(node);
    }
}

fn inherit_down(node: &mut ServiceNode) {
    let fields = InheritedFields::from(&*node);
    for child in &mut node.children {
        child.inherit_from(&fields);
        inherit_down(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inheritance_pass_is_idempotent() {
        let mut root = ServiceNode::new("root");
        root.host = "h".into();
        root.port = 80;
        let mut mid = ServiceNode::new("root.mid");
        mid.children.push(ServiceNode::new("root.mid.leaf"));
        root.children.push(mid);

        let mut services = vec![root];
        apply_inheritance(&mut services);
        let once = services.clone();
        apply_inheritance(&mut services);
        assert_eq!(once, services);
        assert_eq!(services[0].children[0].children[0].host, "h");
        assert_eq!(services[0].children[0].children[0].port, 80);
    }

    #[test]
    fn dialect_names() {
        assert_eq!("Attribute".parse::<Dialect>(), Ok(Dialect::Attribute));
        assert_eq!("block".parse::<Dialect>(), Ok(Dialect::Block));
        assert!("yaml".parse::<Dialect>().is_err());
        assert_eq!(Dialect::default().to_string(), "block");
    }

    #[test]
    fn bundled_block_demo_parses() {
        let config = Dialect::Block
            .parse(include_str!("../../demos/example-health.hcl"))
            .unwrap();
        assert_eq!(config.interval, Some(std::time::Duration::from_secs(30)));
        let ids: Vec<&str> = config.services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            ["public.home", "public.api.status", "ssh", "dns", "db", "backup-box"]
        );
        let status = &config.services[1];
        assert_eq!(status.path.as_deref(), Some("/api/status"));
        assert_eq!(status.retry_count, Some(2));
        assert_eq!(status.response.as_ref().and_then(|r| r.status), Some(200));
    }

    #[test]
    fn bundled_attribute_demo_parses() {
        let config = Dialect::Attribute
            .parse(include_str!("../../demos/example-health.attr"))
            .unwrap();
        assert_eq!(config.services.len(), 2);
        let site = &config.services[0];
        assert_eq!(site.excludes.len(), 2);
        let status = &site.children[1].children[0];
        assert_eq!(status.id, "site.api.status");
        assert_eq!(status.host, "example.com");
        let db = &config.services[1];
        assert_eq!(db.response.as_ref().and_then(|r| r.data.as_ref()).map(Vec::len), Some(2));
    }
}
