//! Field values and their kinds.

use std::fmt;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::bits::bit_width;
use crate::container::Container;

/// A value stored in a container slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    /// Unsigned integer, used for fields that are not a whole number of bytes.
    Int(u64),
    /// Big-endian byte string, used for whole-byte fields.
    Bytes(Vec<u8>),
    Container(Box<Container>),
    Sequence(Vec<Container>),
}

/// Coarse classification of values, used to pick conversions.
///
/// `Bool` is a subtype of `Int`; every kind is a subtype of `Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Any,
    Int,
    Bool,
    Bytes,
    Container,
    Sequence,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::Int,
            Value::Bytes(_) => Self::Bytes,
            Value::Container(_) => Self::Container,
            Value::Sequence(_) => Self::Sequence,
        }
    }

    /// Whether every value of kind `self` is also a value of kind `other`.
    pub fn is_subtype_of(self, other: ValueKind) -> bool {
        self == other || other == Self::Any || (self == Self::Bool && other == Self::Int)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        ValueKind::of(self)
    }

    /// Numeric reading of the value. Byte strings are read big-endian and must
    /// not carry more than 64 significant bits.
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Value::Bool(b) => Some(u64::from(*b)),
            Value::Int(v) => Some(*v),
            Value::Bytes(bytes) => bytes_to_int(bytes),
            Value::Container(_) | Value::Sequence(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Value::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Container]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// True for numeric zero, an all-zero byte string and empty collections.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Bool(b) => !b,
            Value::Int(v) => *v == 0,
            Value::Bytes(bytes) => bytes.iter().all(|&b| b == 0),
            Value::Container(_) => false,
            Value::Sequence(items) => items.is_empty(),
        }
    }
}

/// Big-endian fold of `bytes`, or `None` if it needs more than 64 bits.
pub fn bytes_to_int(bytes: &[u8]) -> Option<u64> {
    let significant = bytes
        .iter()
        .position(|&b| b != 0)
        .map_or(&bytes[bytes.len()..], |first| &bytes[first..]);
    if significant.len() > 8 {
        return None;
    }
    Some(significant.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

/// `value` as exactly `len` big-endian bytes. The caller guarantees it fits.
pub fn int_to_bytes(value: u64, len: usize) -> Vec<u8> {
    let raw = value.to_be_bytes();
    if len >= raw.len() {
        let mut out = vec![0u8; len - raw.len()];
        out.extend_from_slice(&raw);
        out
    } else {
        raw[raw.len() - len..].to_vec()
    }
}

/// Shortest big-endian encoding of `value`, at least one byte.
pub fn minimal_bytes(value: u64) -> Vec<u8> {
    int_to_bytes(value, bit_width(value).div_ceil(8).max(1))
}

/// Upper-case hex rendering without separators.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "0x{v:X}"),
            Value::Bytes(bytes) if bytes.is_empty() => f.write_str("[]"),
            Value::Bytes(bytes) => write!(f, "0x{}", to_hex(bytes)),
            Value::Container(c) => write!(f, "{c}"),
            Value::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(v) => serializer.serialize_u64(*v),
            Value::Bytes(bytes) => serializer.serialize_str(&to_hex(bytes)),
            Value::Container(c) => c.serialize(serializer),
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! impl_from_uint {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(v as u64)
                }
            }
        )*
    };
}

impl_from_uint!(u8, u16, u32, u64, usize);

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Value {
    fn from(v: [u8; N]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Container> for Value {
    fn from(c: Container) -> Self {
        Value::Container(Box::new(c))
    }
}

impl From<Vec<Container>> for Value {
    fn from(items: Vec<Container>) -> Self {
        Value::Sequence(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtype_relation() {
        assert!(ValueKind::Bool.is_subtype_of(ValueKind::Int));
        assert!(!ValueKind::Int.is_subtype_of(ValueKind::Bool));
        assert!(ValueKind::Bytes.is_subtype_of(ValueKind::Any));
        assert!(!ValueKind::Bytes.is_subtype_of(ValueKind::Int));
        assert!(ValueKind::Container.is_subtype_of(ValueKind::Container));
    }

    #[test]
    fn numeric_readings() {
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::Bytes(vec![0x01, 0x02]).as_int(), Some(0x0102));
        assert_eq!(Value::Bytes(vec![0; 13]).as_int(), Some(0));
        assert_eq!(Value::Bytes(vec![0xFF; 9]).as_int(), None);
        assert_eq!(Value::Bytes(vec![]).as_int(), Some(0));
    }

    #[test]
    fn byte_helpers() {
        assert_eq!(int_to_bytes(0x07, 1), vec![0x07]);
        assert_eq!(int_to_bytes(0x0102, 3), vec![0x00, 0x01, 0x02]);
        assert_eq!(int_to_bytes(0, 0), Vec::<u8>::new());
        assert_eq!(int_to_bytes(1, 10).len(), 10);
        assert_eq!(minimal_bytes(0), vec![0x00]);
        assert_eq!(minimal_bytes(0x1234), vec![0x12, 0x34]);
        assert_eq!(to_hex(&[0xDE, 0xAD]), "DEAD");
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Int(0x1F).to_string(), "0x1F");
        assert_eq!(Value::Bytes(vec![0x00, 0x07]).to_string(), "0x0007");
        assert_eq!(Value::Bytes(vec![]).to_string(), "[]");
        assert_eq!(Value::Bool(false).to_string(), "false");
    }

    #[test]
    fn json_forms() {
        assert_eq!(serde_json::to_string(&Value::Int(5)).unwrap(), "5");
        assert_eq!(
            serde_json::to_string(&Value::Bytes(vec![0xDE, 0xAD])).unwrap(),
            "\"DEAD\""
        );
    }
}
