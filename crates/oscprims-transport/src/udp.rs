use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};

/// Largest UDP payload that fits in one datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// A bound UDP socket, optionally connected to a fixed destination.
///
/// The socket is owned exclusively by this value and released on drop.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    peer_addr: Option<SocketAddr>,
}

impl UdpEndpoint {
    /// Bind a local receive endpoint.
    ///
    /// Binding to port 0 picks an ephemeral port; see [`local_addr`](Self::local_addr).
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = socket.local_addr()?;

        info!(%local_addr, "bound udp endpoint");

        Ok(Self {
            socket,
            local_addr,
            peer_addr: None,
        })
    }

    /// Resolve `remote` (`host:port`) and connect a fresh socket to it.
    ///
    /// The local side binds the unspecified address of the remote's family,
    /// on `local_port` when given (so replies can be delivered to a known
    /// port) or an ephemeral port otherwise.
    pub async fn connect(remote: &str, local_port: Option<u16>) -> Result<Self> {
        let peer_addr = resolve(remote).await?;
        let unspecified = match peer_addr.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };

        let mut endpoint = Self::bind(SocketAddr::new(unspecified, local_port.unwrap_or(0))).await?;
        endpoint
            .socket
            .connect(peer_addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: peer_addr,
                source,
            })?;
        endpoint.peer_addr = Some(peer_addr);

        debug!(%peer_addr, local_addr = %endpoint.local_addr, "connected udp endpoint");
        Ok(endpoint)
    }

    /// Send one datagram to the connected destination.
    pub async fn send(&self, datagram: &[u8]) -> Result<usize> {
        let sent = self.socket.send(datagram).await?;
        trace!(bytes = sent, peer = ?self.peer_addr, "sent datagram");
        Ok(sent)
    }

    /// Send one datagram to an explicit destination.
    pub async fn send_to(&self, datagram: &[u8], target: SocketAddr) -> Result<usize> {
        let sent = self.socket.send_to(datagram, target).await?;
        trace!(bytes = sent, %target, "sent datagram");
        Ok(sent)
    }

    /// Wait for the next datagram. Returns its length and sender.
    ///
    /// Cancel-safe: dropping the future before completion loses no datagram.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let (len, from) = self.socket.recv_from(buf).await?;
        trace!(bytes = len, %from, "received datagram");
        Ok((len, from))
    }

    /// The bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The connected destination, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "udp"
    }
}

impl Drop for UdpEndpoint {
    fn drop(&mut self) {
        debug!(local_addr = %self.local_addr, "releasing udp endpoint");
    }
}

async fn resolve(remote: &str) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host(remote)
        .await
        .map_err(|source| TransportError::Resolve {
            host: remote.to_string(),
            source,
        })?;

    addrs.next().ok_or_else(|| TransportError::Resolve {
        host: remote.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn bind_connect_send_receive() {
        let server = UdpEndpoint::bind(loopback()).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(server.peer_addr().is_none());

        let client = UdpEndpoint::connect(&server.local_addr().to_string(), None)
            .await
            .unwrap();
        assert_eq!(client.peer_addr(), Some(server.local_addr()));

        client.send(b"hello").await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");
        assert_eq!(from.port(), client.local_addr().port());
    }

    #[tokio::test]
    async fn connect_uses_requested_local_port() {
        let server = UdpEndpoint::bind(loopback()).await.unwrap();

        let scratch = UdpEndpoint::bind(loopback()).await.unwrap();
        let port = scratch.local_addr().port();
        drop(scratch);

        let client = UdpEndpoint::connect(&server.local_addr().to_string(), Some(port))
            .await
            .unwrap();
        assert_eq!(client.local_addr().port(), port);
    }

    #[tokio::test]
    async fn send_to_explicit_target() {
        let server = UdpEndpoint::bind(loopback()).await.unwrap();
        let sender = UdpEndpoint::bind(loopback()).await.unwrap();

        sender
            .send_to(b"direct", server.local_addr())
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"direct");
    }

    #[tokio::test]
    async fn bind_in_use_port_fails() {
        let first = UdpEndpoint::bind(loopback()).await.unwrap();
        let result = UdpEndpoint::bind(first.local_addr()).await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[tokio::test]
    async fn connect_rejects_unresolvable_remote() {
        let result = UdpEndpoint::connect("missing-port", None).await;
        assert!(matches!(result, Err(TransportError::Resolve { .. })));
    }
}
