use std::fmt;

use bytes::Bytes;

use crate::error::DecodeFault;
use crate::value::{TypeTag, Value};

/// An address path plus an ordered list of atoms.
///
/// The address is not validated here; the codec checks it when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    address: String,
    args: Vec<Value>,
}

impl Message {
    /// Create a message with no arguments.
    ///
    /// The encoder writes the address only up to its first NUL byte.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Create a message from an address and arguments.
    pub fn with_args(address: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            address: address.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Argument at position `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.args.iter()
    }

    /// Type tags of the current arguments, in order.
    pub fn type_tags(&self) -> impl ExactSizeIterator<Item = TypeTag> + '_ {
        self.args.iter().map(Value::tag)
    }

    /// Append any value.
    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        self.args.push(value.into());
        self
    }

    pub fn push_int32(&mut self, value: i32) -> &mut Self {
        self.push(value)
    }

    pub fn push_float32(&mut self, value: f32) -> &mut Self {
        self.push(value)
    }

    pub fn push_string(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(Value::String(value.into()));
        self
    }

    pub fn push_blob(&mut self, value: impl Into<Bytes>) -> &mut Self {
        self.args.push(Value::Blob(value.into()));
        self
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.push(value)
    }

    pub fn push_nil(&mut self) -> &mut Self {
        self.push(Value::Nil)
    }

    /// Consuming form of [`push`](Self::push) for one-expression construction.
    pub fn arg_value(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Split into address and arguments.
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.address, self.args)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)?;
        for value in &self.args {
            write!(f, " {value}")?;
        }
        Ok(())
    }
}

impl Extend<Value> for Message {
    fn extend<I: IntoIterator<Item = Value>>(&mut self, iter: I) {
        self.args.extend(iter);
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

impl IntoIterator for Message {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.into_iter()
    }
}

/// Check that an address is non-empty and starts with '/'.
pub fn validate_address(address: &str) -> Result<(), DecodeFault> {
    if address.is_empty() {
        return Err(DecodeFault::EmptyAddress);
    }
    if !address.starts_with('/') {
        return Err(DecodeFault::AddressMissingSlash {
            address: address.to_string(),
        });
    }
    Ok(())
}
