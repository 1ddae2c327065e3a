use bytes::Bytes;

use crate::value::TypeTag;

/// Errors raised when reading a [`Value`](crate::Value) through the wrong accessor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// The stored tag differs from the requested type.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: TypeTag, actual: TypeTag },

    /// A payload-less value was requested for a tag that carries a payload.
    #[error("type tag '{0}' requires a payload")]
    PayloadRequired(TypeTag),
}

/// The specific structural violation found while decoding.
///
/// Every variant carries the byte offset at which the problem was detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeFault {
    /// Non-null address byte after the address's null terminator.
    #[error("address data after null padding at byte {offset}")]
    AddressAfterPadding { offset: usize },

    /// A comma appeared before the address was null-terminated.
    #[error("address runs into type tags at byte {offset}")]
    AddressOverlapsTypeTags { offset: usize },

    /// The address is empty.
    #[error("address is empty")]
    EmptyAddress,

    /// The address does not begin with '/'.
    #[error("address {address:?} does not begin with '/'")]
    AddressMissingSlash { address: String },

    /// No ',' type-tag marker follows the address.
    #[error("missing type tag marker after byte {offset}")]
    MissingTypeTags { offset: usize },

    /// Non-null type tag byte after the tag list's null terminator.
    #[error("type tag data after null padding at byte {offset}")]
    TypeTagAfterPadding { offset: usize },

    /// A type tag outside the supported set.
    #[error("unknown type tag 0x{tag:02x} at byte {offset}")]
    UnknownTypeTag { tag: u8, offset: usize },

    /// The datagram ended before a complete field could be read.
    #[error("truncated {field}: needed {needed} bytes at byte {offset}, {available} available")]
    Truncated {
        field: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A blob declared a negative length.
    #[error("negative blob length {length} at byte {offset}")]
    NegativeBlobLength { length: i32, offset: usize },

    /// String atom bytes are not valid UTF-8.
    #[error("string atom at byte {offset} is not valid UTF-8")]
    InvalidString { offset: usize },

    /// A bundle element length is negative or runs past the end of the datagram.
    #[error("invalid bundle element length {length} at byte {offset}")]
    InvalidBundleElement { length: i32, offset: usize },

    /// A bundle element is itself a bundle; only one level is unpacked.
    #[error("nested bundle at byte {offset} is not supported")]
    NestedBundle { offset: usize },
}

/// A datagram could not be decoded into messages.
///
/// Carries the raw input and, when parsing got that far, the address.
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed message: {fault}")]
pub struct MalformedMessage {
    data: Bytes,
    address: Option<String>,
    #[source]
    fault: DecodeFault,
}

impl MalformedMessage {
    pub(crate) fn new(data: &[u8], address: Option<String>, fault: DecodeFault) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
            address,
            fault,
        }
    }

    /// The raw bytes that failed to decode.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The address, if it was parsed before the failure.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// The structural violation.
    pub fn fault(&self) -> &DecodeFault {
        &self.fault
    }
}

pub type Result<T> = std::result::Result<T, MalformedMessage>;
