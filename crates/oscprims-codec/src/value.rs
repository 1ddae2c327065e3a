//! Typed atoms carried in a message's argument list.

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;

use crate::error::ValueError;

/// Wire type of an atom. Each variant is exactly one ASCII byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Int32 = b'i',
    Float32 = b'f',
    String = b's',
    Blob = b'b',
    True = b'T',
    False = b'F',
    Nil = b'N',
}

impl TypeTag {
    /// All supported tags.
    pub const ALL: [TypeTag; 7] = [
        TypeTag::Int32,
        TypeTag::Float32,
        TypeTag::String,
        TypeTag::Blob,
        TypeTag::True,
        TypeTag::False,
        TypeTag::Nil,
    ];

    /// The tag's wire byte.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte. Returns `None` for bytes outside the supported set.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'i' => Some(TypeTag::Int32),
            b'f' => Some(TypeTag::Float32),
            b's' => Some(TypeTag::String),
            b'b' => Some(TypeTag::Blob),
            b'T' => Some(TypeTag::True),
            b'F' => Some(TypeTag::False),
            b'N' => Some(TypeTag::Nil),
            _ => None,
        }
    }

    /// Whether values of this type carry payload bytes after the tag list.
    pub const fn has_payload(self) -> bool {
        matches!(
            self,
            TypeTag::Int32 | TypeTag::Float32 | TypeTag::String | TypeTag::Blob
        )
    }

    /// Human-readable type name.
    pub const fn name(self) -> &'static str {
        match self {
            TypeTag::Int32 => "int32",
            TypeTag::Float32 => "float32",
            TypeTag::String => "string",
            TypeTag::Blob => "blob",
            TypeTag::True => "true",
            TypeTag::False => "false",
            TypeTag::Nil => "nil",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}

/// One typed atom.
///
/// Floats compare and hash by bit pattern, so a decoded NaN equals the NaN
/// that was encoded and `Value` can implement `Eq` and `Hash`.
#[derive(Debug, Clone)]
pub enum Value {
    Int32(i32),
    Float32(f32),
    /// Text. It is encoded up to its first NUL byte, if any.
    String(String),
    Blob(Bytes),
    True,
    False,
    Nil,
}

impl Value {
    /// Build a payload-less value from its tag.
    pub fn without_payload(tag: TypeTag) -> Result<Self, ValueError> {
        match tag {
            TypeTag::True => Ok(Value::True),
            TypeTag::False => Ok(Value::False),
            TypeTag::Nil => Ok(Value::Nil),
            other => Err(ValueError::PayloadRequired(other)),
        }
    }

    /// The wire type of this value.
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Int32(_) => TypeTag::Int32,
            Value::Float32(_) => TypeTag::Float32,
            Value::String(_) => TypeTag::String,
            Value::Blob(_) => TypeTag::Blob,
            Value::True => TypeTag::True,
            Value::False => TypeTag::False,
            Value::Nil => TypeTag::Nil,
        }
    }

    pub fn as_int32(&self) -> Result<i32, ValueError> {
        match self {
            Value::Int32(v) => Ok(*v),
            other => Err(other.mismatch(TypeTag::Int32)),
        }
    }

    pub fn as_float32(&self) -> Result<f32, ValueError> {
        match self {
            Value::Float32(v) => Ok(*v),
            other => Err(other.mismatch(TypeTag::Float32)),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(v) => Ok(v),
            other => Err(other.mismatch(TypeTag::String)),
        }
    }

    pub fn as_blob(&self) -> Result<&Bytes, ValueError> {
        match self {
            Value::Blob(v) => Ok(v),
            other => Err(other.mismatch(TypeTag::Blob)),
        }
    }

    /// Read a `True`/`False` atom. Any other tag is a mismatch (reported against `True`).
    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::True => Ok(true),
            Value::False => Ok(false),
            other => Err(other.mismatch(TypeTag::True)),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    fn mismatch(&self, expected: TypeTag) -> ValueError {
        ValueError::TypeMismatch {
            expected,
            actual: self.tag(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::True, Value::True)
            | (Value::False, Value::False)
            | (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            Value::Int32(v) => v.hash(state),
            Value::Float32(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::Blob(v) => v.hash(state),
            Value::True | Value::False | Value::Nil => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Blob(v) => f.write_str(&hex::encode(v)),
            Value::True => f.write_str("true"),
            Value::False => f.write_str("false"),
            Value::Nil => f.write_str("nil"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        if v {
            Value::True
        } else {
            Value::False
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Blob(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(Bytes::from(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(Bytes::copy_from_slice(v))
    }
}

impl TryFrom<&Value> for i32 {
    type Error = ValueError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        value.as_int32()
    }
}

impl TryFrom<&Value> for f32 {
    type Error = ValueError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        value.as_float32()
    }
}

impl TryFrom<&Value> for bool {
    type Error = ValueError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        value.as_bool()
    }
}

impl TryFrom<&Value> for String {
    type Error = ValueError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        value.as_str().map(str::to_string)
    }
}

impl TryFrom<&Value> for Bytes {
    type Error = ValueError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        value.as_blob().cloned()
    }
}
