use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DecodeFault, MalformedMessage, Result};
use crate::message::{validate_address, Message};
use crate::value::{TypeTag, Value};

type Parsed<T> = std::result::Result<T, DecodeFault>;

/// Every field on the wire is aligned to this many bytes.
pub const ALIGNMENT: usize = 4;

/// Marker byte that opens the type-tag list.
pub const TYPE_TAG_MARKER: u8 = b',';

/// Round `len` up to the next multiple of [`ALIGNMENT`].
pub const fn align4(len: usize) -> usize {
    (len + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Size of a null-terminated, null-padded field holding `len` bytes of text.
pub const fn padded_str_len(len: usize) -> usize {
    align4(len + 1)
}

/// Exact number of bytes [`encode_message`] writes for `message`.
pub fn encoded_len(message: &Message) -> usize {
    let payload: usize = message
        .iter()
        .map(|value| match value {
            Value::Int32(_) | Value::Float32(_) => 4,
            Value::String(s) => padded_str_len(up_to_nul(s.as_bytes()).len()),
            Value::Blob(b) => 4 + align4(b.len()),
            Value::True | Value::False | Value::Nil => 0,
        })
        .sum();
    padded_str_len(up_to_nul(message.address().as_bytes()).len())
        + padded_str_len(1 + message.len())
        + payload
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬─────────────────────┬──────────────────────────┐
/// │ Address          │ Type tags           │ Payloads                 │
/// │ "/a/b" \0 pad→4  │ "," tags \0 pad→4   │ one per tag, in order    │
/// └──────────────────┴─────────────────────┴──────────────────────────┘
/// ```
///
/// Int32 and Float32 are 4 bytes big-endian. Strings are null-terminated and
/// padded to 4. Blobs are a 4-byte big-endian length, the data, then 0-3
/// null bytes to the next multiple of 4. True, False and Nil have no payload.
///
/// Encoding never fails. The address is written as-is, except that the
/// address and every string end at their first NUL byte: the rest of that
/// field is dropped so the following fields stay aligned.
pub fn encode_message(message: &Message, dst: &mut BytesMut) {
    dst.reserve(encoded_len(message));

    put_padded_str(dst, message.address().as_bytes());

    let tag_count = 1 + message.len();
    dst.put_u8(TYPE_TAG_MARKER);
    for tag in message.type_tags() {
        dst.put_u8(tag.as_byte());
    }
    put_terminator(dst, tag_count);

    for value in message {
        match value {
            Value::Int32(v) => dst.put_i32(*v),
            Value::Float32(v) => dst.put_f32(*v),
            Value::String(s) => put_padded_str(dst, s.as_bytes()),
            Value::Blob(b) => {
                dst.put_u32(b.len() as u32);
                dst.put_slice(b);
                dst.put_bytes(0, align4(b.len()) - b.len());
            }
            Value::True | Value::False | Value::Nil => {}
        }
    }
}

/// Encode a message into a new buffer.
pub fn encode(message: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(message));
    encode_message(message, &mut buf);
    buf.freeze()
}

fn put_padded_str(dst: &mut BytesMut, bytes: &[u8]) {
    let bytes = up_to_nul(bytes);
    dst.put_slice(bytes);
    put_terminator(dst, bytes.len());
}

/// The bytes before the first NUL, which is where a decoder ends the field.
fn up_to_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Write the null terminator and padding after `written` bytes of text.
fn put_terminator(dst: &mut BytesMut, written: usize) {
    dst.put_bytes(0, padded_str_len(written) - written);
}

/// Decode a single message.
///
/// Any structural violation is reported as [`MalformedMessage`] carrying the
/// input bytes and the address, if it was parsed before the failure. Bytes
/// after the last payload are ignored.
pub fn decode_message(data: &[u8]) -> Result<Message> {
    let mut address = None;
    decode_parts(data, &mut address).map_err(|fault| MalformedMessage::new(data, address, fault))
}

fn decode_parts(data: &[u8], parsed_address: &mut Option<String>) -> Parsed<Message> {
    let mut reader = Reader::new(data);

    let address = reader.read_address()?;
    *parsed_address = Some(address.clone());
    validate_address(&address)?;

    let tags = reader.read_type_tags()?;

    let mut message = Message::new(address);
    for tag in tags {
        let value = match tag {
            TypeTag::Int32 => Value::Int32(i32::from_be_bytes(reader.read_word("int32")?)),
            TypeTag::Float32 => Value::Float32(f32::from_be_bytes(reader.read_word("float32")?)),
            TypeTag::String => Value::String(reader.read_string()?),
            TypeTag::Blob => Value::Blob(reader.read_blob()?),
            TypeTag::True => Value::True,
            TypeTag::False => Value::False,
            TypeTag::Nil => Value::Nil,
        };
        message.push(value);
    }

    Ok(message)
}

/// Sequential reader over one datagram.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &'static str) -> Parsed<&'a [u8]> {
        if len > self.remaining() {
            return Err(DecodeFault::Truncated {
                field,
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            });
        }
        let data = self.data;
        let slice = &data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_word(&mut self, field: &'static str) -> Parsed<[u8; 4]> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(ALIGNMENT, field)?);
        Ok(word)
    }

    /// Read 4-byte groups until a null-padded group ends the address.
    fn read_address(&mut self) -> Parsed<String> {
        let start = self.pos;
        let mut end = None;

        while end.is_none() {
            let offset = self.pos;
            let group = self.take(ALIGNMENT, "address")?;
            for (i, &byte) in group.iter().enumerate() {
                if byte == 0 {
                    if end.is_none() {
                        end = Some(offset + i);
                    }
                } else if end.is_some() {
                    return Err(DecodeFault::AddressAfterPadding { offset: offset + i });
                } else if byte == TYPE_TAG_MARKER {
                    return Err(DecodeFault::AddressOverlapsTypeTags { offset: offset + i });
                }
            }
        }

        let end = end.unwrap_or(start);
        String::from_utf8(self.data[start..end].to_vec())
            .map_err(|_| DecodeFault::InvalidString { offset: start })
    }

    /// Skip to the ',' marker, then read tags until a null-padded group.
    fn read_type_tags(&mut self) -> Parsed<Vec<TypeTag>> {
        let marker = self.data[self.pos..]
            .iter()
            .position(|&b| b == TYPE_TAG_MARKER)
            .ok_or(DecodeFault::MissingTypeTags { offset: self.pos })?;
        self.pos += marker;

        let mut tags = Vec::new();
        let mut at_marker = true;
        let mut terminated = false;

        while !terminated {
            let offset = self.pos;
            let group = self.take(ALIGNMENT, "type tags")?;
            for (i, &byte) in group.iter().enumerate() {
                if at_marker {
                    at_marker = false;
                    continue;
                }
                if byte == 0 {
                    terminated = true;
                } else if terminated {
                    return Err(DecodeFault::TypeTagAfterPadding { offset: offset + i });
                } else {
                    let tag = TypeTag::from_byte(byte).ok_or(DecodeFault::UnknownTypeTag {
                        tag: byte,
                        offset: offset + i,
                    })?;
                    tags.push(tag);
                }
            }
        }

        Ok(tags)
    }

    fn read_string(&mut self) -> Parsed<String> {
        let start = self.pos;
        loop {
            let group = self.take(ALIGNMENT, "string")?;
            if group.contains(&0) {
                break;
            }
        }

        let raw = &self.data[start..self.pos];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        std::str::from_utf8(&raw[..len])
            .map(str::to_string)
            .map_err(|_| DecodeFault::InvalidString { offset: start })
    }

    fn read_blob(&mut self) -> Parsed<Bytes> {
        let offset = self.pos;
        let length = i32::from_be_bytes(self.read_word("blob length")?);
        if length < 0 {
            return Err(DecodeFault::NegativeBlobLength { length, offset });
        }

        let length = length as usize;
        let blob = Bytes::copy_from_slice(self.take(length, "blob")?);
        self.take(align4(length) - length, "blob padding")?;
        Ok(blob)
    }
}
