use std::net::{Ipv4Addr, SocketAddr};

use oscprims_transport::MAX_DATAGRAM_SIZE;

/// Port used when no bind address is given.
pub const DEFAULT_PORT: u16 = 9000;

/// Default capacity of the message and failure broadcast channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Server behavior configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Local address to receive on.
    pub bind_addr: SocketAddr,
    /// Receive buffer size. Larger datagrams are truncated by the OS.
    pub max_datagram_size: usize,
    /// Buffered events per subscriber before the slowest one lags.
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_datagram_size: MAX_DATAGRAM_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Client connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Destination as `host:port`.
    pub remote: String,
    /// Local port to send from; ephemeral when `None`.
    pub local_port: Option<u16>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote: format!("127.0.0.1:{DEFAULT_PORT}"),
            local_port: None,
        }
    }
}

impl ClientConfig {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            local_port: None,
        }
    }

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(server.max_datagram_size, MAX_DATAGRAM_SIZE);

        let client = ClientConfig::new("localhost:9001").with_local_port(9002);
        assert_eq!(client.remote, "localhost:9001");
        assert_eq!(client.local_port, Some(9002));
    }

    #[test]
    fn channel_capacity_is_never_zero() {
        let config = ServerConfig::default().with_channel_capacity(0);
        assert_eq!(config.channel_capacity, 1);
    }
}
