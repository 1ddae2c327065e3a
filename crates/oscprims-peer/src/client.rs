use std::net::SocketAddr;

use oscprims_codec::{encode, encode_bundle_to_bytes, Message, TIME_TAG_IMMEDIATE};
use oscprims_transport::UdpEndpoint;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{PeerError, Result};

/// Sends encoded messages to one remote endpoint.
///
/// Each message goes out as one datagram. Delivery is best effort.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    endpoint: Option<UdpEndpoint>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            endpoint: None,
        }
    }

    /// Open the endpoint. Connecting again replaces the previous endpoint.
    pub async fn connect(&mut self) -> Result<()> {
        if let Some(previous) = self.endpoint.take() {
            debug!(local_addr = %previous.local_addr(), "replacing client endpoint");
            drop(previous);
        }

        let endpoint = UdpEndpoint::connect(&self.config.remote, self.config.local_port).await?;
        info!(
            remote = %self.config.remote,
            local_addr = %endpoint.local_addr(),
            "client connected"
        );
        self.endpoint = Some(endpoint);
        Ok(())
    }

    /// Release the endpoint.
    pub fn disconnect(&mut self) -> Result<()> {
        let endpoint = self.endpoint.take().ok_or(PeerError::NotConnected)?;
        info!(local_addr = %endpoint.local_addr(), "client disconnected");
        Ok(())
    }

    /// Encode and send one message. Returns the datagram size.
    pub async fn send(&self, message: &Message) -> Result<usize> {
        let endpoint = self.endpoint()?;
        let datagram = encode(message);
        debug!(address = message.address(), bytes = datagram.len(), "sending message");
        Ok(endpoint.send(&datagram).await?)
    }

    /// Send several messages as one bundle datagram.
    pub async fn send_bundle(&self, messages: &[Message]) -> Result<usize> {
        let endpoint = self.endpoint()?;
        let datagram = encode_bundle_to_bytes(TIME_TAG_IMMEDIATE, messages);
        debug!(messages = messages.len(), bytes = datagram.len(), "sending bundle");
        Ok(endpoint.send(&datagram).await?)
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Local address of the open endpoint.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(UdpEndpoint::local_addr)
    }

    fn endpoint(&self) -> Result<&UdpEndpoint> {
        self.endpoint.as_ref().ok_or(PeerError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use oscprims_codec::{decode_message, decode_packet};

    use super::*;

    async fn receiver() -> UdpEndpoint {
        UdpEndpoint::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap()
    }

    async fn recv(endpoint: &UdpEndpoint) -> Vec<u8> {
        let mut buf = vec![0u8; 1024];
        let (len, _) = endpoint.recv_from(&mut buf).await.unwrap();
        buf.truncate(len);
        buf
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let mut client = Client::new(ClientConfig::new("127.0.0.1:9"));
        assert!(!client.is_connected());
        assert!(matches!(
            client.send(&Message::new("/ping")).await,
            Err(PeerError::NotConnected)
        ));
        assert!(matches!(client.disconnect(), Err(PeerError::NotConnected)));
    }

    #[tokio::test]
    async fn sends_one_datagram_per_message() {
        let server = receiver().await;
        let mut client = Client::new(ClientConfig::new(server.local_addr().to_string()));
        client.connect().await.unwrap();
        assert!(client.is_connected());

        let message = Message::new("/track/3/select").arg_value(3);
        let sent = client.send(&message).await.unwrap();
        assert_eq!(sent, 24);

        let datagram = recv(&server).await;
        assert_eq!(decode_message(&datagram).unwrap(), message);
    }

    #[tokio::test]
    async fn reconnect_replaces_endpoint() {
        let server = receiver().await;
        let mut client = Client::new(ClientConfig::new(server.local_addr().to_string()));

        client.connect().await.unwrap();
        client.connect().await.unwrap();
        client.send(&Message::new("/again")).await.unwrap();
        assert_eq!(
            decode_message(&recv(&server).await).unwrap().address(),
            "/again"
        );

        client.disconnect().unwrap();
        assert!(!client.is_connected());
        assert!(client.local_addr().is_none());
    }

    #[tokio::test]
    async fn bundle_arrives_as_one_datagram() {
        let server = receiver().await;
        let mut client = Client::new(ClientConfig::new(server.local_addr().to_string()));
        client.connect().await.unwrap();

        let messages = vec![
            Message::new("/a").arg_value(1),
            Message::new("/b").arg_value("two"),
        ];
        client.send_bundle(&messages).await.unwrap();

        assert_eq!(decode_packet(&recv(&server).await).unwrap(), messages);
    }
}
