//! The attribute-prefixed dialect:
//!
//! ```text
//! .interval 30s
//! api {
//!   .protocol 'https'
//!   .host 'api.example.com'
//!   !users { .path ^'/users' }
//!   -internal { .path '/internal' }
//! }
//! ```
//!
//! Attributes are `.name value` statements; blocks are `name { ... }`, with
//! `!name` marking an executable check and `-name` an exclude rule for the
//! enclosing block.

use std::time::Duration;
use tracing::{debug, warn};

use super::error::{ParseError, SyntaxError};
use super::lexical::{self, is_identifier_char, Cursor, QuoteState};
use crate::models::{Config, DataRow, ExcludeRule, ResponseExpectation, ServiceNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Plain,
    Executable,
    Exclude,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Duration(Duration),
    Rows(Vec<DataRow>),
    Int(i64),
    Text { text: String, prefix: bool },
}

#[derive(Debug, Clone)]
struct Attribute {
    name: String,
    value: Value,
}

#[derive(Debug, Clone)]
struct Block {
    kind: BlockKind,
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<Block>,
}

impl Block {
    /// Only an unmarked `response` block describes the expected response.
    fn is_response(&self) -> bool {
        self.kind == BlockKind::Plain && self.name == "response"
    }
}

/// Parses attribute-dialect text. Blank input yields an empty config.
pub fn parse(input: &str) -> Result<Config, ParseError> {
    if input.trim().is_empty() {
        return Ok(Config::default());
    }
    let cleaned = preprocess(input);
    parse_cleaned(&cleaned).map_err(|reason| ParseError::new(reason, &cleaned))
}

fn parse_cleaned(cleaned: &str) -> Result<Config, SyntaxError> {
    let split = first_block_start(cleaned).unwrap_or(cleaned.len());
    let globals = global_attributes(cleaned, split)?;
    let blocks = blocks(cleaned, split)?;

    let mut config = Config::default();
    for attr in globals {
        match (attr.name.as_str(), attr.value) {
            ("interval", value) => config.interval = duration_of(&attr.name, value),
            (other, _) => debug!(attribute = other, "Ignoring unsupported global attribute"),
        }
    }
    config.services = blocks
        .iter()
        .filter_map(|block| build_node(block, None))
        .collect();
    super::apply_inheritance(&mut config.services);
    Ok(config)
}

/// Normalises line endings, strips comments and makes sure every `{` that
/// follows a block name directly is separated from it by a space.
fn preprocess(input: &str) -> String {
    let stripped = lexical::strip_comments(input, QuoteState::default());
    let mut out = String::with_capacity(stripped.len() + 16);
    let mut quotes = QuoteState::default();
    let mut prev: Option<char> = None;
    for c in stripped.chars() {
        quotes.feed(c);
        if c == '{' && !quotes.in_quotes() {
            if let Some(p) = prev {
                if is_identifier_char(p) || p == '!' {
                    out.push(' ');
                }
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Offset of the first unquoted `name {`, `!name {` or `-name {` whose name
/// is not an attribute (not preceded by `.`).
fn first_block_start(text: &str) -> Option<usize> {
    let mut quotes = QuoteState::default();
    let mut prev: Option<char> = None;
    for (i, c) in text.char_indices() {
        quotes.feed(c);
        let starts_name = !quotes.in_quotes()
            && (is_identifier_char(c) || c == '!')
            && !prev.is_some_and(|p| is_identifier_char(p) || p == '.' || p == '!');
        if starts_name && looks_like_block_start(&text[i..]) {
            return Some(i);
        }
        prev = Some(c);
    }
    None
}

fn looks_like_block_start(rest: &str) -> bool {
    let after_marker = rest.strip_prefix(['!', '-']).unwrap_or(rest);
    let name_len = after_marker
        .find(|c: char| !is_identifier_char(c))
        .unwrap_or(after_marker.len());
    name_len > 0 && after_marker[name_len..].trim_start().starts_with('{')
}

fn global_attributes(text: &str, end: usize) -> Result<Vec<Attribute>, SyntaxError> {
    let mut cur = Cursor::new(&text[..end]);
    let mut attributes = Vec::new();
    loop {
        cur.skip_whitespace();
        if cur.is_eof() {
            return Ok(attributes);
        }
        attributes.push(attribute(&mut cur)?);
    }
}

/// Parses every block from `start` to the end of input. Top-level attribute
/// statements after the first block are accepted and dropped.
fn blocks(text: &str, start: usize) -> Result<Vec<Block>, SyntaxError> {
    let mut cur = Cursor::new(text);
    cur.reset(start);
    let mut blocks = Vec::new();
    loop {
        cur.skip_whitespace();
        match cur.peek() {
            None => return Ok(blocks),
            Some('}') => return Err(SyntaxError::UnexpectedCloseBrace(cur.pos())),
            Some('.') => {
                let ignored = attribute(&mut cur)?;
                debug!(attribute = %ignored.name, "Ignoring global attribute declared after the first block");
            }
            Some(_) => blocks.push(block(&mut cur)?),
        }
    }
}

fn block(cur: &mut Cursor<'_>) -> Result<Block, SyntaxError> {
    let start = cur.pos();
    let kind = if cur.eat('!') {
        BlockKind::Executable
    } else if cur.eat('-') {
        BlockKind::Exclude
    } else {
        BlockKind::Plain
    };
    let name = lexical::identifier(cur)
        .ok_or_else(|| SyntaxError::unexpected("a block name", cur.rest(), cur.pos()))?
        .to_string();
    cur.skip_whitespace();
    cur.expect('{', "'{'")?;

    let mut attributes = Vec::new();
    let mut children = Vec::new();
    loop {
        cur.skip_whitespace();
        match cur.peek() {
            None => return Err(SyntaxError::UnclosedBlock { name, offset: start }),
            Some('}') => {
                cur.bump();
                break;
            }
            Some('.') => attributes.push(attribute(cur)?),
            Some(_) => children.push(block(cur)?),
        }
    }
    Ok(Block {
        kind,
        name,
        attributes,
        children,
    })
}

/// `.name <whitespace> value`; the value is mandatory.
fn attribute(cur: &mut Cursor<'_>) -> Result<Attribute, SyntaxError> {
    let start = cur.pos();
    cur.expect('.', "'.'")?;
    let name = lexical::identifier(cur)
        .ok_or_else(|| SyntaxError::unexpected("an attribute name", cur.rest(), cur.pos()))?
        .to_string();
    if !cur.skip_whitespace() {
        return Err(SyntaxError::MissingValue { name, offset: start });
    }
    match value(cur)? {
        Some(value) => Ok(Attribute { name, value }),
        None => Err(SyntaxError::MissingValue { name, offset: start }),
    }
}

fn value(cur: &mut Cursor<'_>) -> Result<Option<Value>, SyntaxError> {
    if let Some(d) = lexical::duration(cur)? {
        return Ok(Some(Value::Duration(d)));
    }
    if let Some(rows) = lexical::json_array(cur)? {
        return Ok(Some(Value::Rows(rows)));
    }
    if let Some(n) = lexical::integer(cur)? {
        return Ok(Some(Value::Int(n)));
    }
    if cur.eat('^') {
        return match lexical::quoted(cur)? {
            Some(text) => Ok(Some(Value::Text { text, prefix: true })),
            None => Err(SyntaxError::unexpected("a quoted path after '^'", cur.rest(), cur.pos())),
        };
    }
    Ok(lexical::quoted(cur)?.map(|text| Value::Text {
        text,
        prefix: false,
    }))
}

fn build_node(block: &Block, parent_id: Option<&str>) -> Option<ServiceNode> {
    if block.kind == BlockKind::Exclude {
        return None;
    }
    let id = match parent_id {
        Some(parent) => format!("{parent}.{}", block.name),
        None => block.name.clone(),
    };
    let mut node = ServiceNode::new(id);
    for attr in &block.attributes {
        apply_attribute(&mut node, attr);
    }

    if let Some(response) = block.children.iter().find(|b| b.is_response()) {
        node.response = Some(build_response(response));
    }

    for child in &block.children {
        match child.kind {
            BlockKind::Exclude => node.excludes.push(build_exclude(child)),
            _ if child.is_response() => {}
            _ => {
                if let Some(built) = build_node(child, Some(&node.id)) {
                    node.children.push(built);
                }
            }
        }
    }
    Some(node)
}

fn apply_attribute(node: &mut ServiceNode, attr: &Attribute) {
    let name = attr.name.as_str();
    match (name, &attr.value) {
        ("name", Value::Text { text, .. }) => node.name = Some(text.clone()),
        ("protocol", Value::Text { text, .. }) => node.protocol = text.clone(),
        ("host", Value::Text { text, .. }) => node.host = text.clone(),
        ("port", Value::Int(n)) => match u16::try_from(*n) {
            Ok(port) => node.port = port,
            Err(_) => warn!(node = %node.id, port = n, "Ignoring out-of-range port"),
        },
        ("timeout", v) => node.timeout = duration_of(name, v.clone()),
        ("interval", v) => node.interval = duration_of(name, v.clone()),
        ("retry_delay", v) => node.retry_delay = duration_of(name, v.clone()),
        ("retry_count", Value::Int(n)) => node.retry_count = u32::try_from(*n).ok(),
        ("method", Value::Text { text, .. }) => node.method = Some(text.clone()),
        ("path", Value::Text { text, prefix }) => {
            node.path = Some(text.clone());
            node.path_is_prefix = *prefix;
        }
        ("query", Value::Text { text, .. }) => node.query = Some(text.clone()),
        ("command", Value::Text { text, .. }) => node.command = Some(text.clone()),
        ("username", Value::Text { text, .. }) => node.username = Some(text.clone()),
        ("password", Value::Text { text, .. }) => node.password = Some(text.clone()),
        ("database", Value::Text { text, .. }) => node.database = Some(text.clone()),
        ("expected_status" | "status", Value::Int(n)) => {
            node.response_mut().status = u16::try_from(*n).ok();
        }
        ("body_contains", Value::Text { text, .. }) => {
            node.response_mut().body_contains = Some(text.clone());
        }
        ("body_regex", Value::Text { text, .. }) => {
            node.response_mut().body_regex = Some(text.clone());
        }
        _ => debug!(node = %node.id, attribute = name, "Ignoring unknown or mistyped attribute"),
    }
}

fn build_response(block: &Block) -> ResponseExpectation {
    let mut response = ResponseExpectation::default();
    for attr in &block.attributes {
        match (attr.name.as_str(), &attr.value) {
            ("status", Value::Int(n)) => response.status = u16::try_from(*n).ok(),
            ("rows", Value::Int(n)) => response.rows = Some(*n),
            ("columns", Value::Int(n)) => response.columns = Some(*n),
            ("exit_code", Value::Int(n)) => response.exit_code = i32::try_from(*n).ok(),
            ("data", Value::Rows(rows)) => response.data = Some(rows.clone()),
            ("body_contains", Value::Text { text, .. }) => response.body_contains = Some(text.clone()),
            ("body_regex", Value::Text { text, .. }) => response.body_regex = Some(text.clone()),
            (other, _) => debug!(attribute = other, "Ignoring unknown response attribute"),
        }
    }
    response
}

fn build_exclude(block: &Block) -> ExcludeRule {
    let mut rule = ExcludeRule::default();
    for attr in &block.attributes {
        if let ("path", Value::Text { text, prefix }) = (attr.name.as_str(), &attr.value) {
            rule.path = Some(text.clone());
            rule.path_is_prefix = *prefix;
        }
    }
    rule
}

/// Durations may be written bare (`30s`) or quoted (`'30s'`); a quoted
/// value that is not a duration falls back to 60 s.
fn duration_of(name: &str, value: Value) -> Option<Duration> {
    match value {
        Value::Duration(d) => Some(d),
        Value::Text { text, .. } => Some(lexical::parse_duration_or_default(&text)),
        _ => {
            debug!(attribute = name, "Ignoring non-duration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_ok(text: &str) -> Config {
        parse(text).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    #[test]
    fn blank_input_is_empty_config() {
        assert_eq!(parse("").unwrap(), Config::default());
        assert_eq!(parse("  \n\t ").unwrap(), Config::default());
    }

    #[test]
    fn global_interval_and_simple_service() {
        let config = parse_ok(
            r#"
            # global settings
            .interval 30s

            web {
              .name 'Web site'
              .protocol 'https'
              .host "example.com"
              .port 443
              .timeout 500ms
              .path '/status'
              .expected_status 204
            }
            "#,
        );
        assert_eq!(config.interval, Some(Duration::from_secs(30)));
        assert_eq!(config.services.len(), 1);
        let web = &config.services[0];
        assert_eq!(web.id, "web");
        assert_eq!(web.display_name(), "Web site");
        assert_eq!(web.protocol, "https");
        assert_eq!(web.host, "example.com");
        assert_eq!(web.port, 443);
        assert_eq!(web.timeout, Some(Duration::from_millis(500)));
        assert_eq!(web.path.as_deref(), Some("/status"));
        assert!(!web.path_is_prefix);
        assert_eq!(web.response.as_ref().and_then(|r| r.status), Some(204));
    }

    #[test]
    fn backslash_does_not_escape_quotes() {
        let config = parse_ok(
            "a {\n  .command 'dir C:\\'  # list drive\n  .host 'h'\n  .path \"\\\"  # root\n}",
        );
        let a = &config.services[0];
        assert_eq!(a.command.as_deref(), Some("dir C:\\"));
        assert_eq!(a.host, "h");
        assert_eq!(a.path.as_deref(), Some("\\"));
    }

    #[test]
    fn marked_response_blocks_are_not_expectations() {
        let config = parse_ok(
            r#"
            a {
              .protocol 'http'
              .host 'h'
              .status 503
              -response { .path '/response' }
              !response { .path '/probe' }
            }
            "#,
        );
        let a = &config.services[0];
        assert_eq!(a.response.as_ref().and_then(|r| r.status), Some(503));
        assert_eq!(a.excludes.len(), 1);
        assert_eq!(a.excludes[0].path.as_deref(), Some("/response"));
        assert_eq!(a.children.len(), 1);
        assert_eq!(a.children[0].id, "a.response");
    }

    #[test]
    fn four_level_inheritance_chain() {
        let config = parse_ok(
            r#"
            root {
              .protocol 'http'
              .host 'h.example'
              .port 8080
              .timeout 2s
              .method 'HEAD'
              middle {
                inner {
                  !leaf { .path '/leaf' }
                }
              }
            }
            "#,
        );
        let leaf = &config.services[0].children[0].children[0].children[0];
        assert_eq!(leaf.id, "root.middle.inner.leaf");
        assert_eq!(leaf.protocol, "http");
        assert_eq!(leaf.host, "h.example");
        assert_eq!(leaf.port, 8080);
        assert_eq!(leaf.timeout, Some(Duration::from_secs(2)));
        assert_eq!(leaf.method.as_deref(), Some("HEAD"));
    }

    #[test]
    fn closer_ancestor_wins() {
        let config = parse_ok(
            "a { .host 'outer' .port 1 b { .port 2 c { } } }",
        );
        let c = &config.services[0].children[0].children[0];
        assert_eq!(c.host, "outer");
        assert_eq!(c.port, 2);
    }

    #[test]
    fn parsing_is_idempotent() {
        let text = "x { .host 'h' .port 22 !y { .command 'uptime' } -z { .path ^'/z' } }";
        assert_eq!(parse_ok(text), parse_ok(text));
    }

    #[test]
    fn prefix_marker_sets_flag() {
        let config = parse_ok("a { .path ^'/api' }\nb { .path '/api' }");
        assert_eq!(config.services[0].path.as_deref(), Some("/api"));
        assert!(config.services[0].path_is_prefix);
        assert_eq!(config.services[1].path.as_deref(), Some("/api"));
        assert!(!config.services[1].path_is_prefix);
    }

    #[test]
    fn exclude_blocks_become_rules_not_nodes() {
        let config = parse_ok(
            r#"
            site {
              .host 'h'
              -health { .path ^'/health' }
              -exact { .path '/metrics' }
              !home { .path '/' }
            }
            "#,
        );
        let site = &config.services[0];
        assert_eq!(site.children.len(), 1);
        assert_eq!(site.children[0].id, "site.home");
        assert_eq!(
            site.excludes,
            vec![
                ExcludeRule { path: Some("/health".into()), path_is_prefix: true },
                ExcludeRule { path: Some("/metrics".into()), path_is_prefix: false },
            ]
        );
    }

    #[test]
    fn response_block_beats_shorthand_and_first_block_wins() {
        let config = parse_ok(
            r#"
            db {
              .protocol 'mysql'
              .status 500
              .query 'SELECT id, name FROM t'
              response {
                .rows 2
                .columns 2
                .data [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]
              }
              response { .rows 99 }
            }
            "#,
        );
        let response = config.services[0].response.clone().unwrap();
        assert_eq!(response.status, None);
        assert_eq!(response.rows, Some(2));
        assert_eq!(response.columns, Some(2));
        let data = response.data.unwrap();
        assert_eq!(data[1]["name"], json!("b"));
        assert!(config.services[0].children.is_empty());
    }

    #[test]
    fn attributes_and_blocks_interleave() {
        let config = parse_ok("p { .host 'h' c1 { } .port 9 c2 { } }");
        let p = &config.services[0];
        assert_eq!(p.port, 9);
        assert_eq!(p.children.len(), 2);
        assert_eq!(p.children[1].port, 9);
    }

    #[test]
    fn missing_space_before_brace_is_tolerated() {
        let config = parse_ok("svc{ .host 'h' !child{ .port 1 } }");
        assert_eq!(config.services[0].children[0].id, "svc.child");
    }

    #[test]
    fn braces_and_hashes_inside_strings_are_literal() {
        let config = parse_ok(r#"svc { .body_contains '{"ok":true} #1' .query "it's {x}" }"#);
        let svc = &config.services[0];
        assert_eq!(
            svc.response.as_ref().and_then(|r| r.body_contains.as_deref()),
            Some(r#"{"ok":true} #1"#)
        );
        assert_eq!(svc.query.as_deref(), Some("it's {x}"));
    }

    #[test]
    fn escaped_single_quote() {
        let config = parse_ok("svc { .command 'echo ''hi''' }");
        assert_eq!(config.services[0].command.as_deref(), Some("echo 'hi'"));
    }

    #[test]
    fn trailing_global_attributes_are_ignored() {
        let config = parse_ok("a { .host 'h' }\n.interval 5s\nb { }");
        assert_eq!(config.interval, None);
        assert_eq!(config.services.len(), 2);
    }

    #[test]
    fn quoted_durations_fall_back() {
        let config = parse_ok("a { .timeout '5s' .retry_delay 'later' .retry_count 2 }");
        let a = &config.services[0];
        assert_eq!(a.timeout, Some(Duration::from_secs(5)));
        assert_eq!(a.retry_delay, Some(Duration::from_secs(60)));
        assert_eq!(a.retry_count, Some(2));
    }

    #[test]
    fn missing_closing_brace_fails() {
        let err = parse("a { .host 'h'\n b { .port 1 }").unwrap_err();
        assert!(matches!(err.reason, SyntaxError::UnclosedBlock { ref name, .. } if name == "a"));
        assert!(err.to_string().starts_with("Failed to parse config"));
    }

    #[test]
    fn extra_closing_brace_fails() {
        let err = parse("a { .host 'h' }\n}").unwrap_err();
        assert!(matches!(err.reason, SyntaxError::UnexpectedCloseBrace(_)));
    }

    #[test]
    fn attribute_without_value_fails() {
        let err = parse("a {\n .host\n}").unwrap_err();
        assert!(matches!(err.reason, SyntaxError::MissingValue { ref name, .. } if name == "host"));
        let err = parse(".interval\n").unwrap_err();
        assert!(matches!(err.reason, SyntaxError::MissingValue { .. }));
    }

    #[test]
    fn unterminated_string_fails() {
        let err = parse("a { .host 'never closed }").unwrap_err();
        assert!(matches!(err.reason, SyntaxError::UnterminatedString(_)));
        assert_eq!(err.input_len, "a { .host 'never closed }".len());
    }
}
