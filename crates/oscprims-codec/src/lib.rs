//! Typed-atom message model and wire codec.
//!
//! This is the protocol layer of oscprims. A message is an address path plus
//! an ordered list of typed atoms, encoded as:
//! - The address, null-terminated and padded to a 4-byte boundary
//! - A ',' followed by one type-tag byte per atom, null-terminated and padded
//! - Each atom's payload in tag order, big-endian and 4-byte aligned
//!
//! Several messages may share one datagram inside a bundle. All functions here
//! are pure: no I/O, no shared state.

pub mod bundle;
pub mod codec;
pub mod error;
pub mod message;
pub mod value;

pub use bundle::{
    decode_bundle, decode_packet, encode_bundle, encode_bundle_to_bytes, is_bundle, BUNDLE_TAG,
    TIME_TAG_IMMEDIATE,
};
pub use codec::{decode_message, encode, encode_message, encoded_len, ALIGNMENT};
pub use error::{DecodeFault, MalformedMessage, Result, ValueError};
pub use message::{validate_address, Message};
pub use value::{TypeTag, Value};
