//! Typed-atom messaging over UDP.
//!
//! oscprims encodes address-routed messages of typed atoms (int32, float32,
//! string, blob, true, false, nil) into aligned big-endian datagrams, sends
//! them to a remote endpoint, and receives them on a server that routes each
//! message to every handler whose address pattern matches.
//!
//! # Crate Structure
//!
//! - [`codec`]: Value and Message model, wire encode/decode, bundles
//! - [`transport`]: UDP endpoint
//! - [`peer`]: Client, Server and Dispatcher (behind `peer` feature)

/// Re-export codec types.
pub mod codec {
    pub use oscprims_codec::*;
}

/// Re-export transport types.
pub mod transport {
    pub use oscprims_transport::*;
}

/// Re-export client/server types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use oscprims_peer::*;
}
