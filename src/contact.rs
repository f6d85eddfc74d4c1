use crate::types::DnsError;
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Receive buffer size: the classic non-EDNS UDP limit.
pub const MAX_UDP_PAYLOAD: usize = 512;

/// Sends one query datagram and hands back the raw reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, server: SocketAddr, query: &[u8]) -> Result<Vec<u8>, DnsError>;
}

/// Plain UDP, one fresh socket per exchange.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    timeout: Duration,
}

impl UdpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, server: SocketAddr, query: &[u8]) -> Result<Vec<u8>, DnsError> {
        // Bind on a random available local port
        let local = match server.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let sock = UdpSocket::bind(local)
            .await
            .map_err(|e| DnsError::Transport(format!("can't bind UDP socket: {e}")))?;

        tokio::time::timeout(self.timeout, sock.send_to(query, server))
            .await
            .map_err(|_| DnsError::Timeout(server))?
            .map_err(|e| DnsError::Transport(format!("can't send DNS packet to {server}: {e}")))?;

        let mut buffer = vec![0u8; MAX_UDP_PAYLOAD];
        let (size, from) = tokio::time::timeout(self.timeout, sock.recv_from(&mut buffer))
            .await
            .map_err(|_| DnsError::Timeout(server))?
            .map_err(|e| DnsError::Transport(format!("can't read DNS packet from {server}: {e}")))?;

        if from != server {
            warn!(expected = %server, received_from = %from, "UDP reply from unexpected source");
        }

        buffer.truncate(size);
        debug!(server = %server, bytes = size, "UDP reply received");
        Ok(buffer)
    }
}
