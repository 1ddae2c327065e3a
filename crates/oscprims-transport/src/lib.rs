//! Datagram transport for oscprims.
//!
//! Provides a thin, logged wrapper over tokio's UDP socket:
//! - bind a local receive endpoint
//! - resolve and connect to a fixed remote destination
//! - send and receive whole datagrams
//!
//! This is the lowest layer of oscprims. Delivery is unreliable and
//! unordered between datagrams; nothing here retries or reorders.

pub mod error;
pub mod udp;

pub use error::{Result, TransportError};
pub use udp::{UdpEndpoint, MAX_DATAGRAM_SIZE};
