use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;

use super::{ProbeError, effective_timeout};
use crate::models::ServiceNode;

/// UDP is connectionless: a datagram that leaves the socket counts as alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpChecker;

impl UdpChecker {
    pub(crate) async fn probe(&self, node: &ServiceNode) -> Result<(), ProbeError> {
        timeout(effective_timeout(node), send_empty_datagram(node))
            .await
            .map_err(|_| ProbeError::ConnectTimeout)?
    }
}

async fn send_empty_datagram(node: &ServiceNode) -> Result<(), ProbeError> {
    let peer = lookup_host((node.host.as_str(), node.port))
        .await?
        .next()
        .ok_or_else(|| ProbeError::Resolve(node.host.clone()))?;
    let local = if peer.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = UdpSocket::bind(local).await?;
    socket.send_to(&[], peer).await?;
    Ok(())
}
