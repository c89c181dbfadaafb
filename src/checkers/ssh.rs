use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;

use super::{ProbeError, effective_timeout};
use crate::models::ServiceNode;

const DEFAULT_USER: &str = "root";
const DEFAULT_PORT: u16 = 22;

/// Runs the node's command through the system `ssh` client with key-based,
/// non-interactive authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshChecker;

impl SshChecker {
    pub(crate) async fn probe(&self, node: &ServiceNode) -> Result<(), ProbeError> {
        let mut command = Command::new("ssh");
        command
            .args(ssh_args(node))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let output = timeout(effective_timeout(node), command.output())
            .await
            .map_err(|_| ProbeError::ConnectTimeout)??;

        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        evaluate_exit(node, code, stderr.trim())
    }
}

pub fn ssh_args(node: &ServiceNode) -> Vec<String> {
    let connect_secs = effective_timeout(node).as_secs().max(1);
    let user = node
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or(DEFAULT_USER);
    let port = if node.port == 0 { DEFAULT_PORT } else { node.port };
    let remote_command = node
        .command
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or("true");
    vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={connect_secs}"),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-p".to_string(),
        port.to_string(),
        "--".to_string(),
        format!("{user}@{}", node.host),
        remote_command.to_string(),
    ]
}

/// The exit code must equal the configured one, or 0 when none is set.
pub fn evaluate_exit(node: &ServiceNode, code: i32, stderr: &str) -> Result<(), ProbeError> {
    let expected = node.response.as_ref().and_then(|r| r.exit_code).unwrap_or(0);
    if code == expected {
        Ok(())
    } else {
        Err(ProbeError::Mismatch(format!(
            "Exit code: {code}, Error: {stderr}"
        )))
    }
}
