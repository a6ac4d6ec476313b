//! Value predicates attached to field descriptors.
//!
//! A field accepts a value when any of its checks accepts it, or when it has
//! no checks at all.

use std::fmt;
use std::sync::Arc;

use crate::bits::mask;
use crate::value::Value;

/// Predicate over a candidate field value.
#[derive(Clone)]
pub enum Check {
    /// Accepts everything.
    Any,
    /// `true`, `false`, `0` or `1`.
    Bool,
    /// Integer within `[min, max]`. Byte strings are read big-endian.
    IntRange { min: u64, max: u64 },
    /// Byte string of exactly this many bytes.
    FixedByteLength(usize),
    /// Byte string whose length lies within the bounds.
    ByteLength {
        min: Option<usize>,
        max: Option<usize>,
    },
    /// Integer equal to one of the listed values.
    OneOf(Vec<u64>),
    /// Binary coded decimal integer of at most this many digits.
    Bcd(usize),
    /// Container built from the named schema.
    Container(&'static str),
    Custom(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl Check {
    /// Integer fitting in `bits` bits.
    pub fn width(bits: usize) -> Self {
        Check::IntRange {
            min: 0,
            max: mask(bits),
        }
    }

    /// A single byte, as integer or one-byte string.
    pub fn byte() -> Self {
        Check::width(8)
    }

    pub fn custom(predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Check::Custom(Arc::new(predicate))
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Check::Any => true,
            Check::Bool => matches!(value, Value::Bool(_) | Value::Int(0) | Value::Int(1)),
            Check::IntRange { min, max } => numeric(value).is_some_and(|v| *min <= v && v <= *max),
            Check::FixedByteLength(len) => value.as_bytes().is_some_and(|b| b.len() == *len),
            Check::ByteLength { min, max } => value.as_bytes().is_some_and(|b| {
                min.map_or(true, |min| b.len() >= min) && max.map_or(true, |max| b.len() <= max)
            }),
            Check::OneOf(allowed) => numeric(value).is_some_and(|v| allowed.contains(&v)),
            Check::Bcd(digits) => numeric(value).is_some_and(|v| is_bcd(v, *digits)),
            Check::Container(schema) => value
                .as_container()
                .is_some_and(|c| c.schema().name() == *schema),
            Check::Custom(predicate) => predicate(value),
        }
    }
}

fn numeric(value: &Value) -> Option<u64> {
    match value {
        Value::Bool(_) | Value::Int(_) | Value::Bytes(_) => value.as_int(),
        Value::Container(_) | Value::Sequence(_) => None,
    }
}

fn is_bcd(mut value: u64, digits: usize) -> bool {
    for _ in 0..digits.min(16) {
        if value & 0xF > 9 {
            return false;
        }
        value >>= 4;
    }
    value == 0
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Any => f.write_str("Any"),
            Check::Bool => f.write_str("Bool"),
            Check::IntRange { min, max } => write!(f, "IntRange({min:#X}..={max:#X})"),
            Check::FixedByteLength(len) => write!(f, "FixedByteLength({len})"),
            Check::ByteLength { min, max } => write!(f, "ByteLength({min:?}..={max:?})"),
            Check::OneOf(allowed) => write!(f, "OneOf({allowed:X?})"),
            Check::Bcd(digits) => write!(f, "Bcd({digits})"),
            Check::Container(schema) => write!(f, "Container({schema})"),
            Check::Custom(_) => f.write_str("Custom"),
        }
    }
}
