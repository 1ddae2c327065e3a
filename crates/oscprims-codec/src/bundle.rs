//! Bundle framing: several messages in one datagram under a shared time tag.
//!
//! ```text
//! ┌────────────────┬────────────────┬──────────────┬─────────────┬─────┐
//! │ "#bundle\0"    │ Time tag       │ Length       │ Message     │ ... │
//! │ (8B)           │ (8B, opaque)   │ (4B BE)      │ (Length B)  │     │
//! └────────────────┴────────────────┴──────────────┴─────────────┴─────┘
//! ```
//!
//! The time tag is carried but never interpreted. Only one level of bundle
//! framing is unpacked.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::codec::{decode_message, encode_message, encoded_len};
use crate::error::{DecodeFault, MalformedMessage, Result};
use crate::message::Message;

/// Bundle identifier, including its null terminator.
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Bundle header size: identifier (8) + time tag (8).
pub const BUNDLE_HEADER_SIZE: usize = 16;

/// The conventional "process immediately" time tag.
pub const TIME_TAG_IMMEDIATE: u64 = 1;

/// Whether `data` starts with the bundle identifier.
pub fn is_bundle(data: &[u8]) -> bool {
    data.len() >= BUNDLE_TAG.len() && data[..BUNDLE_TAG.len()] == BUNDLE_TAG[..]
}

/// Encode messages into one bundle.
pub fn encode_bundle(time_tag: u64, messages: &[Message], dst: &mut BytesMut) {
    let body: usize = messages.iter().map(|m| 4 + encoded_len(m)).sum();
    dst.reserve(BUNDLE_HEADER_SIZE + body);

    dst.put_slice(BUNDLE_TAG);
    dst.put_u64(time_tag);
    for message in messages {
        dst.put_u32(encoded_len(message) as u32);
        encode_message(message, dst);
    }
}

/// Encode messages into a new bundle buffer.
pub fn encode_bundle_to_bytes(time_tag: u64, messages: &[Message]) -> Bytes {
    let mut buf = BytesMut::new();
    encode_bundle(time_tag, messages, &mut buf);
    buf.freeze()
}

/// Decode a bundle into its messages, in order.
///
/// Returns `Ok(None)` when `data` does not start with the bundle identifier.
/// A malformed element aborts the whole bundle; the error describes that
/// element.
pub fn decode_bundle(data: &[u8]) -> Result<Option<Vec<Message>>> {
    if !is_bundle(data) {
        return Ok(None);
    }

    let malformed = |fault| MalformedMessage::new(data, None, fault);

    if data.len() < BUNDLE_HEADER_SIZE {
        return Err(malformed(DecodeFault::Truncated {
            field: "bundle time tag",
            offset: BUNDLE_TAG.len(),
            needed: BUNDLE_HEADER_SIZE - BUNDLE_TAG.len(),
            available: data.len() - BUNDLE_TAG.len(),
        }));
    }

    let mut pos = BUNDLE_HEADER_SIZE;
    let mut messages = Vec::new();

    while pos < data.len() {
        if data.len() - pos < 4 {
            return Err(malformed(DecodeFault::Truncated {
                field: "bundle element length",
                offset: pos,
                needed: 4,
                available: data.len() - pos,
            }));
        }

        let mut word = [0u8; 4];
        word.copy_from_slice(&data[pos..pos + 4]);
        let length = i32::from_be_bytes(word);
        let offset = pos;
        pos += 4;

        if length < 0 || length as usize > data.len() - pos {
            return Err(malformed(DecodeFault::InvalidBundleElement { length, offset }));
        }

        let element = &data[pos..pos + length as usize];
        if is_bundle(element) {
            return Err(malformed(DecodeFault::NestedBundle { offset: pos }));
        }

        messages.push(decode_message(element)?);
        pos += length as usize;
    }

    Ok(Some(messages))
}

/// Decode one datagram: as a bundle if it carries the identifier, otherwise
/// as a single message.
pub fn decode_packet(data: &[u8]) -> Result<Vec<Message>> {
    if let Some(messages) = decode_bundle(data)? {
        trace!(len = data.len(), messages = messages.len(), "decoded bundle");
        return Ok(messages);
    }

    let message = decode_message(data)?;
    trace!(len = data.len(), address = message.address(), "decoded message");
    Ok(vec![message])
}
