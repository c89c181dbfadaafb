use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{ProbeError, effective_timeout};
use crate::models::ServiceNode;

/// Alive when a TCP connection can be opened within the timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpChecker;

impl TcpChecker {
    pub(crate) async fn probe(&self, node: &ServiceNode) -> Result<(), ProbeError> {
        match timeout(
            effective_timeout(node),
            TcpStream::connect((node.host.as_str(), node.port)),
        )
        .await
        {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProbeError::ConnectTimeout),
        }
    }
}
