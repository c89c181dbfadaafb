use regex::Regex;
use reqwest::Method;

use super::{CheckTarget, ProbeError, effective_timeout};
use crate::models::{ResponseExpectation, ServiceNode};

/// HTTP and HTTPS probes over a shared `reqwest` client.
#[derive(Clone, Default)]
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(crate::version::user_agent())
            .build()
            .unwrap_or_default();
        Self::with_client(client)
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub(crate) async fn probe(&self, node: &ServiceNode, target: &CheckTarget) -> Result<(), ProbeError> {
        let method_name = node
            .method
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| ProbeError::Mismatch(format!("Invalid HTTP method: {method_name}")))?;

        let response = self
            .client
            .request(method, request_url(node, &target.route))
            .timeout(effective_timeout(node))
            .send()
            .await?;

        let status = response.status();
        let expectation = node.response.as_ref();
        let status_ok = match expectation.and_then(|r| r.status) {
            Some(expected) => status.as_u16() == expected,
            None => status.is_success(),
        };
        if !status_ok {
            return Err(ProbeError::Mismatch(format!("HTTP {status}")));
        }

        match expectation {
            Some(expect) if wants_body(expect) => {
                let body = response.text().await?;
                validate_body(&body, expect)
            }
            _ => Ok(()),
        }
    }
}

/// `<scheme>://<host>[:<port>]<route>`
pub fn request_url(node: &ServiceNode, route: &str) -> String {
    let scheme = node.protocol.to_ascii_lowercase();
    let slash = if route.starts_with('/') { "" } else { "/" };
    if node.port == 0 {
        format!("{scheme}://{}{slash}{route}", node.host)
    } else {
        format!("{scheme}://{}:{}{slash}{route}", node.host, node.port)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn wants_body(expect: &ResponseExpectation) -> bool {
    non_empty(&expect.body_contains).is_some() || non_empty(&expect.body_regex).is_some()
}

/// Substring match is case-insensitive; the regex is applied as written.
pub fn validate_body(body: &str, expect: &ResponseExpectation) -> Result<(), ProbeError> {
    if let Some(needle) = non_empty(&expect.body_contains) {
        if !body.to_lowercase().contains(&needle.to_lowercase()) {
            return Err(ProbeError::Mismatch(format!(
                "Response body does not contain expected text: {needle}"
            )));
        }
    }
    if let Some(pattern) = non_empty(&expect.body_regex) {
        let regex = Regex::new(pattern)
            .map_err(|e| ProbeError::Mismatch(format!("Invalid regex pattern: {e}")))?;
        if !regex.is_match(body) {
            return Err(ProbeError::Mismatch(format!(
                "Response body does not match regex pattern: {pattern}"
            )));
        }
    }
    Ok(())
}
