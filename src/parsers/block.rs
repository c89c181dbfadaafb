//! The typed-block dialect:
//!
//! ```text
//! interval = "30s"
//! group "api" {
//!   protocol = "https"
//!   host     = env("API_HOST")
//!   path     = "/api"
//!   service "users" { path = "/users" }
//! }
//! ```
//!
//! Groups are transparent containers that pass their attributes down as a
//! key/value map. Services always become nodes; only those with both a
//! protocol and a host are kept at the top of the tree.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::error::{ParseError, SyntaxError};
use super::lexical::{self, QuoteState, format_duration};
use crate::models::{Config, ResponseExpectation, ServiceNode};

static BLOCK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(group|service)\s+"([^"]+)"\s*$"#).expect("Invalid block header pattern")
});

static RESPONSE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bresponse\s*$").expect("Invalid response header pattern"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(\w+)\s*=\s*("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|env\("[^"]*"\)|\d+(?:ms|s|m|h)?\b|\[[^\n]*?\])"#,
    )
    .expect("Invalid attribute pattern")
});

static RESPONSE_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\s*=\s*(\d+)\b").expect("Invalid response attribute pattern"));

static ENV_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^env\("([^"]+)"\)$"#).expect("Invalid env() pattern"));

static DANGLING_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\s*=\s*$").expect("Invalid dangling key pattern"));

type Attributes = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Group,
    Service,
}

#[derive(Debug)]
struct RawBlock {
    kind: BlockKind,
    name: String,
    body: Body,
}

/// Contents of one brace-delimited body (or of the whole file).
#[derive(Debug, Default)]
struct Body {
    attributes: Vec<(String, String)>,
    response: Option<Vec<(String, i64)>>,
    children: Vec<RawBlock>,
}

/// Parses block-dialect text. Blank input yields an empty config.
pub fn parse(input: &str) -> Result<Config, ParseError> {
    if input.trim().is_empty() {
        return Ok(Config::default());
    }
    let cleaned = lexical::strip_comments(input, QuoteState::with_backslash_escapes());
    let root = parse_body(&cleaned, 0).map_err(|reason| ParseError::new(reason, &cleaned))?;
    Ok(build_config(root))
}

fn parse_body(text: &str, base: usize) -> Result<Body, SyntaxError> {
    let spans = top_level_spans(text, base)?;
    let mut body = Body::default();
    let mut own = text.as_bytes().to_vec();
    let mut floor = 0;

    for (open, close) in spans {
        let header = &text[floor..open];
        let inner = &text[open + 1..close];
        let header_start = if let Some(caps) = BLOCK_HEADER.captures(header) {
            let kind = if &caps[1] == "group" {
                BlockKind::Group
            } else {
                BlockKind::Service
            };
            body.children.push(RawBlock {
                kind,
                name: caps[2].to_string(),
                body: parse_body(inner, base + open + 1)?,
            });
            caps.get(0).map_or(open, |m| floor + m.start())
        } else if let Some(m) = RESPONSE_HEADER.find(header) {
            if body.response.is_none() {
                body.response = Some(response_pairs(inner));
            } else {
                debug!(offset = base + open, "Ignoring repeated response block");
            }
            floor + m.start()
        } else {
            let line_start = header.rfind('\n').map_or(floor, |i| floor + i + 1);
            warn!(
                header = text[line_start..open].trim(),
                offset = base + open,
                "Ignoring unrecognised block"
            );
            line_start
        };
        blank(&mut own, header_start, close + 1);
        floor = close + 1;
    }

    let own = String::from_utf8_lossy(&own).into_owned();
    let mut residue = own.as_bytes().to_vec();
    for caps in ATTRIBUTE.captures_iter(&own) {
        body.attributes
            .push((caps[1].to_string(), resolve_value(&caps[2])));
        if let Some(m) = caps.get(0) {
            blank(&mut residue, m.start(), m.end());
        }
    }
    check_residue(&String::from_utf8_lossy(&residue), base)?;
    Ok(body)
}

/// Byte ranges `(open, close)` of every brace pair at depth 0. Braces inside
/// quoted strings or bracketed literals do not count.
fn top_level_spans(text: &str, base: usize) -> Result<Vec<(usize, usize)>, SyntaxError> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut brackets = 0usize;
    let mut open_at = 0;
    let mut string: Option<(char, usize)> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some((quote, _)) = string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => string = Some((c, i)),
            '[' => brackets += 1,
            ']' => brackets = brackets.saturating_sub(1),
            '{' if brackets == 0 => {
                if depth == 0 {
                    open_at = i;
                }
                depth += 1;
            }
            '}' if brackets == 0 => {
                if depth == 0 {
                    return Err(SyntaxError::UnexpectedCloseBrace(base + i));
                }
                depth -= 1;
                if depth == 0 {
                    spans.push((open_at, i));
                }
            }
            _ => {}
        }
    }

    if let Some((_, start)) = string {
        return Err(SyntaxError::UnterminatedString(base + start));
    }
    if depth > 0 {
        let header = &text[..open_at];
        let name = match BLOCK_HEADER.captures(header) {
            Some(caps) => caps[2].to_string(),
            None if RESPONSE_HEADER.is_match(header) => "response".to_string(),
            None => "block".to_string(),
        };
        return Err(SyntaxError::UnclosedBlock {
            name,
            offset: base + open_at,
        });
    }
    Ok(spans)
}

fn blank(bytes: &mut [u8], from: usize, to: usize) {
    for b in &mut bytes[from..to] {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

/// Whatever is left after attributes and blocks are taken out should be
/// whitespace. A `key =` with nothing after it is an error; other leftovers
/// are logged and skipped.
fn check_residue(residue: &str, base: usize) -> Result<(), SyntaxError> {
    let mut offset = 0;
    for line in residue.split('\n') {
        let content = line.trim();
        if !content.is_empty() {
            if let Some(caps) = DANGLING_KEY.captures(content) {
                return Err(SyntaxError::MissingValue {
                    name: caps[1].to_string(),
                    offset: base + offset,
                });
            }
            warn!(content, offset = base + offset, "Ignoring unrecognised content");
        }
        offset += line.len() + 1;
    }
    Ok(())
}

fn response_pairs(inner: &str) -> Vec<(String, i64)> {
    RESPONSE_ATTRIBUTE
        .captures_iter(inner)
        .filter_map(|caps| Some((caps[1].to_string(), caps[2].parse().ok()?)))
        .collect()
}

/// `env("NAME")` resolves to the variable's value, or stays as written when
/// it is unset. Anything else is unquoted.
fn resolve_value(raw: &str) -> String {
    if let Some(caps) = ENV_CALL.captures(raw) {
        return std::env::var(&caps[1]).unwrap_or_else(|_| raw.to_string());
    }
    unquote(raw)
}

fn unquote(raw: &str) -> String {
    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    if !quoted {
        return raw.to_string();
    }
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next @ ('"' | '\'' | '\\')) => out.push(next),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn build_config(root: Body) -> Config {
    let mut config = Config::default();
    for (key, value) in &root.attributes {
        match key.as_str() {
            "interval" => config.interval = Some(lexical::parse_duration_or_default(value)),
            other => debug!(attribute = other, "Ignoring unsupported global attribute"),
        }
    }

    let top = Attributes::new();
    for block in &root.children {
        match block.kind {
            BlockKind::Group => collect_group(block, &top, None, &mut config.services),
            BlockKind::Service => keep_if_checkable(build_service(block, &top, None), &mut config.services),
        }
    }
    config
}

fn collect_group(block: &RawBlock, inherited: &Attributes, parent_id: Option<&str>, out: &mut Vec<ServiceNode>) {
    let id = join_id(parent_id, &block.name);
    let attributes = merge(inherited, &block.body.attributes);
    if block.body.response.is_some() {
        debug!(group = %id, "Ignoring response block on a group");
    }
    for child in &block.body.children {
        match child.kind {
            BlockKind::Group => collect_group(child, &attributes, Some(&id), out),
            BlockKind::Service => keep_if_checkable(build_service(child, &attributes, Some(&id)), out),
        }
    }
}

fn keep_if_checkable(node: ServiceNode, out: &mut Vec<ServiceNode>) {
    if node.protocol.is_empty() || node.host.is_empty() {
        debug!(service = %node.id, "Dropping service without protocol or host");
        return;
    }
    out.push(node);
}

fn build_service(block: &RawBlock, inherited: &Attributes, parent_id: Option<&str>) -> ServiceNode {
    let mut node = ServiceNode::new(join_id(parent_id, &block.name));
    for (key, value) in &merge(inherited, &block.body.attributes) {
        apply_attribute(&mut node, key, value);
    }
    if let Some(pairs) = &block.body.response {
        node.response = Some(build_response(pairs));
    }

    let passed_down = inheritable(&node);
    for child in &block.body.children {
        match child.kind {
            BlockKind::Service => {
                let built = build_service(child, &passed_down, Some(&node.id));
                node.children.push(built);
            }
            BlockKind::Group => warn!(service = %node.id, group = %child.name, "Ignoring group nested in a service"),
        }
    }
    node
}

/// Inherited values overlaid with the block's own. `name` never passes
/// down; `path` is joined onto the inherited one.
fn merge(inherited: &Attributes, own: &[(String, String)]) -> Attributes {
    let mut merged = inherited.clone();
    merged.remove("name");
    for (key, value) in own {
        let value = if key == "path" {
            join_path(inherited.get("path").map(String::as_str), value)
        } else {
            value.clone()
        };
        merged.insert(key.clone(), value);
    }
    merged
}

/// Joins an inherited path and an own path as `/<inherited>/<own>`. A `^`
/// prefix marker on either side is kept on the result, the own side winning.
fn join_path(inherited: Option<&str>, own: &str) -> String {
    let Some(inherited) = inherited else {
        return own.to_string();
    };
    let prefix = if own.is_empty() {
        inherited.starts_with('^')
    } else {
        own.starts_with('^')
    };
    let own_clean = own.trim_start_matches('^');
    let left = inherited.trim_start_matches('^').trim_matches('/');
    let right = own_clean.trim_matches('/');
    let joined = match (left.is_empty(), right.is_empty()) {
        (false, false) => format!("/{left}/{right}"),
        (false, true) => format!("/{left}"),
        (true, false) => format!("/{right}"),
        (true, true) => own_clean.to_string(),
    };
    if prefix {
        format!("^{joined}")
    } else {
        joined
    }
}

fn join_id(parent_id: Option<&str>, name: &str) -> String {
    match parent_id {
        Some(parent) => format!("{parent}.{name}"),
        None => name.to_string(),
    }
}

/// What a service hands to the services nested inside it. `path` stays
/// behind: the route of a nested service is built from its ancestors.
fn inheritable(node: &ServiceNode) -> Attributes {
    let mut map = Attributes::new();
    let mut put = |key: &str, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            map.insert(key.to_string(), value);
        }
    };
    put("protocol", Some(node.protocol.clone()));
    put("host", Some(node.host.clone()));
    put("port", (node.port != 0).then(|| node.port.to_string()));
    put("timeout", node.timeout.map(format_duration));
    put("method", node.method.clone());
    put("username", node.username.clone());
    put("password", node.password.clone());
    put("database", node.database.clone());
    map
}

fn apply_attribute(node: &mut ServiceNode, key: &str, value: &str) {
    match key {
        "name" => node.name = Some(value.to_string()),
        "protocol" => node.protocol = value.to_string(),
        "host" => node.host = value.to_string(),
        "port" => match value.parse::<u16>() {
            Ok(port) => node.port = port,
            Err(_) => warn!(service = %node.id, port = value, "Ignoring invalid port"),
        },
        "timeout" => node.timeout = Some(lexical::parse_duration_or_default(value)),
        "interval" => node.interval = Some(lexical::parse_duration_or_default(value)),
        "retry_delay" => node.retry_delay = Some(lexical::parse_duration_or_default(value)),
        "retry_count" => node.retry_count = value.parse().ok(),
        "method" => node.method = Some(value.to_string()),
        "path" => {
            node.path_is_prefix = value.starts_with('^');
            node.path = Some(value.trim_start_matches('^').to_string());
        }
        "query" => node.query = Some(value.to_string()),
        "command" => node.command = Some(value.to_string()),
        "username" => node.username = Some(value.to_string()),
        "password" => node.password = Some(value.to_string()),
        "database" => node.database = Some(value.to_string()),
        "expected_status" | "status" => {
            if let Ok(status) = value.parse::<u16>() {
                node.response_mut().status = Some(status);
            }
        }
        "body_contains" => node.response_mut().body_contains = Some(value.to_string()),
        "body_regex" => node.response_mut().body_regex = Some(value.to_string()),
        other => debug!(service = %node.id, attribute = other, "Ignoring unknown attribute"),
    }
}

fn build_response(pairs: &[(String, i64)]) -> ResponseExpectation {
    let mut response = ResponseExpectation::default();
    for (key, value) in pairs {
        match key.as_str() {
            "status" => response.status = u16::try_from(*value).ok(),
            "rows" => response.rows = Some(*value),
            "columns" => response.columns = Some(*value),
            "exit_code" => response.exit_code = i32::try_from(*value).ok(),
            other => debug!(attribute = other, "Ignoring unknown response attribute"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::route::full_route;
    use std::time::Duration;

    fn parse_ok(text: &str) -> Config {
        parse(text).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    #[test]
    fn blank_input_is_empty_config() {
        assert_eq!(parse("\n  \n").unwrap(), Config::default());
    }

    #[test]
    fn nested_groups_join_ids_and_paths() {
        let config = parse_ok(
            r#"
            group "api" {
              protocol = "https"
              host = "api.example.com"
              path = "/api"
              group "v1" {
                path = "/v1"
                service "users" {
                  path = "/users"
                }
              }
            }
            "#,
        );
        assert_eq!(config.services.len(), 1);
        let users = &config.services[0];
        assert_eq!(users.id, "api.v1.users");
        assert_eq!(users.path.as_deref(), Some("/api/v1/users"));
        assert_eq!(users.protocol, "https");
        assert_eq!(users.host, "api.example.com");
        assert_eq!(users.name, None);
    }

    #[test]
    fn service_without_path_takes_group_path() {
        let config = parse_ok(
            r#"group "g" { protocol = "http" host = "h" path = "^/static" service "s" { } }"#,
        );
        assert_eq!(config.services[0].path.as_deref(), Some("/static"));
        assert!(config.services[0].path_is_prefix);
    }

    #[test]
    fn services_without_protocol_or_host_are_dropped() {
        let config = parse_ok(
            r#"
            service "no-host" { protocol = "tcp" }
            service "no-protocol" { host = "h" }
            service "ok" { protocol = "tcp" host = "h" port = 22 }
            group "g" { service "also-no-host" { protocol = "udp" } }
            "#,
        );
        let ids: Vec<_> = config.services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
        assert_eq!(config.services[0].port, 22);
    }

    #[test]
    fn env_calls_substitute_or_stay_literal() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("WEBDOCTOR_BLOCK_TEST_HOST", "db.internal") };
        let config = parse_ok(
            r#"
            service "db" {
              protocol = "postgresql"
              host = env("WEBDOCTOR_BLOCK_TEST_HOST")
              password = env("WEBDOCTOR_BLOCK_TEST_UNSET_VAR")
            }
            "#,
        );
        let db = &config.services[0];
        assert_eq!(db.host, "db.internal");
        assert_eq!(db.password.as_deref(), Some(r#"env("WEBDOCTOR_BLOCK_TEST_UNSET_VAR")"#));
    }

    #[test]
    fn braces_and_escapes_inside_strings() {
        let config = parse_ok(
            r#"
            service "web" {
              protocol = "http"
              host = "h"
              body_contains = "say \"hi\" } {"
              command = 'it\'s'
            }
            "#,
        );
        let web = &config.services[0];
        assert_eq!(
            web.response.as_ref().and_then(|r| r.body_contains.as_deref()),
            Some(r#"say "hi" } {"#)
        );
        assert_eq!(web.command.as_deref(), Some("it's"));
    }

    #[test]
    fn nested_services_inherit_from_parent_service() {
        let config = parse_ok(
            r#"
            service "db" {
              protocol = "mysql"
              host = "db"
              port = 3306
              timeout = 5s
              username = "monitor"
              interval = "2m"
              service "replica" {
                host = "replica"
                query = "SELECT 1"
                response { rows = 1 columns = 1 }
              }
            }
            "#,
        );
        let db = &config.services[0];
        assert_eq!(db.interval, Some(Duration::from_secs(120)));
        let replica = &db.children[0];
        assert_eq!(replica.id, "db.replica");
        assert_eq!(replica.protocol, "mysql");
        assert_eq!(replica.host, "replica");
        assert_eq!(replica.port, 3306);
        assert_eq!(replica.timeout, Some(Duration::from_secs(5)));
        assert_eq!(replica.username.as_deref(), Some("monitor"));
        let response = replica.response.as_ref().unwrap();
        assert_eq!((response.rows, response.columns), (Some(1), Some(1)));
    }

    #[test]
    fn nested_services_route_through_their_ancestors() {
        let config = parse_ok(
            r#"
            service "a" {
              protocol = "http"
              host = "h"
              path = "/a"
              service "b" {
                path = "/b"
                service "c" { path = "/c" }
              }
            }
            "#,
        );
        let a = &config.services[0];
        let b = &a.children[0];
        let c = &b.children[0];
        assert_eq!(c.id, "a.b.c");
        assert_eq!(c.host, "h");
        assert_eq!(b.path.as_deref(), Some("/b"));
        assert_eq!(c.path.as_deref(), Some("/c"));
        assert_eq!(full_route(&[a], b), "/b");
        assert_eq!(full_route(&[a, b], c), "/b/c");
    }

    #[test]
    fn block_keywords_must_be_whole_words() {
        let config = parse_ok(
            r#"
            myservice "x" { protocol = "tcp" host = "h" }
            subgroup "g" { service "z" { protocol = "tcp" host = "h" } }
            service "y" { protocol = "tcp" host = "h" }
            "#,
        );
        let ids: Vec<_> = config.services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["y"]);
    }

    #[test]
    fn response_block_replaces_shorthand() {
        let config = parse_ok(
            r#"service "s" { protocol = "ssh" host = "h" status = 200 response { exit_code = 3 } }"#,
        );
        let response = config.services[0].response.clone().unwrap();
        assert_eq!(response.status, None);
        assert_eq!(response.exit_code, Some(3));
    }

    #[test]
    fn only_depth_zero_attributes_are_global() {
        let config = parse_ok(
            r#"
            interval = "45s"
            group "g" {
              interval = "5s"
              protocol = "tcp"
              service "s" { host = "h" }
            }
            "#,
        );
        assert_eq!(config.interval, Some(Duration::from_secs(45)));
        assert_eq!(config.services[0].interval, Some(Duration::from_secs(5)));
    }

    #[test]
    fn group_ignores_attributes_of_its_children() {
        let config = parse_ok(
            r#"
            group "g" {
              protocol = "http"
              service "a" { host = "a" port = 81 }
              service "b" { host = "b" }
            }
            "#,
        );
        assert_eq!(config.services[1].id, "g.b");
        assert_eq!(config.services[1].port, 0);
    }

    #[test]
    fn bad_duration_falls_back_to_sixty_seconds() {
        let config = parse_ok(r#"service "s" { protocol = "tcp" host = "h" timeout = "soon" }"#);
        assert_eq!(config.services[0].timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = r#"group "g" { host = "h" protocol = "udp" service "a" { port = 53 } }"#;
        assert_eq!(parse_ok(text), parse_ok(text));
    }

    #[test]
    fn structural_errors() {
        let err = parse(r#"service "s" { host = "h""#).unwrap_err();
        assert!(matches!(err.reason, SyntaxError::UnclosedBlock { ref name, .. } if name == "s"));

        let err = parse(r#"service "s" { host = "h" } }"#).unwrap_err();
        assert!(matches!(err.reason, SyntaxError::UnexpectedCloseBrace(_)));

        let err = parse("service \"s\" {\n  host =\n}").unwrap_err();
        assert!(matches!(err.reason, SyntaxError::MissingValue { ref name, .. } if name == "host"));

        let err = parse(r#"service "s" { host = "h }"#).unwrap_err();
        assert!(matches!(err.reason, SyntaxError::UnterminatedString(_)));
    }
}
