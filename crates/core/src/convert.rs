//! Conversions applied to values assigned to a field.
//!
//! A field lists conversions keyed by the kind of value they accept. When a
//! value could match several entries, the most specific one runs: each listed
//! kind `T_i` contributes `2^i` to the weight of every kind that is a subtype
//! of it, and entries are tried from heaviest to lightest.

use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::value::{bytes_to_int, Value, ValueKind};

/// Result of a converter. Errors are plain reasons; the field attaches its
/// name and origin.
pub type ConvertResult = std::result::Result<Value, String>;

/// Returns the value length, in bits, for a field whose length is not
/// declared. Receives the buffer, the bit offset of the value and the limit.
pub type LengthHint = fn(&[u8], usize, usize) -> Option<usize>;

#[derive(Clone)]
pub enum Converter {
    Plain(Arc<dyn Fn(Value) -> ConvertResult + Send + Sync>),
    /// Needs the container holding the field.
    WithContainer(Arc<dyn Fn(Value, &Container) -> ConvertResult + Send + Sync>),
}

#[derive(Clone)]
pub struct Conversion {
    pub source: ValueKind,
    pub converter: Converter,
    pub length_hint: Option<LengthHint>,
}

impl Conversion {
    pub fn plain(
        source: ValueKind,
        f: impl Fn(Value) -> ConvertResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            converter: Converter::Plain(Arc::new(f)),
            length_hint: None,
        }
    }

    pub fn with_container(
        source: ValueKind,
        f: impl Fn(Value, &Container) -> ConvertResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            converter: Converter::WithContainer(Arc::new(f)),
            length_hint: None,
        }
    }

    pub fn length_hint(mut self, hint: LengthHint) -> Self {
        self.length_hint = Some(hint);
        self
    }
}

/// Conversions of one field, kept in application order.
#[derive(Clone, Default)]
pub struct Conversions {
    entries: Vec<Conversion>,
}

impl Conversions {
    pub fn new(entries: Vec<Conversion>) -> Self {
        let listed: Vec<ValueKind> = entries.iter().map(|c| c.source).collect();
        let mut entries = entries;
        entries.sort_by_key(|c| std::cmp::Reverse(weight(c.source, &listed)));
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversion> {
        self.entries.iter()
    }

    /// Runs the first conversion whose source kind accepts `value`.
    ///
    /// Without a container, conversions that need one leave the value as is;
    /// they run again once the value lands in a container.
    pub fn apply(&self, value: Value, container: Option<&Container>) -> ConvertResult {
        let kind = value.kind();
        let Some(entry) = self.entries.iter().find(|c| kind.is_subtype_of(c.source)) else {
            return Ok(value);
        };
        match (&entry.converter, container) {
            (Converter::Plain(f), _) => f(value),
            (Converter::WithContainer(f), Some(container)) => f(value, container),
            (Converter::WithContainer(_), None) => Ok(value),
        }
    }

    /// First length hint registered for a kind accepting `kind`.
    pub fn length_hint(&self, kind: ValueKind) -> Option<LengthHint> {
        self.entries
            .iter()
            .filter(|c| kind.is_subtype_of(c.source))
            .find_map(|c| c.length_hint)
    }
}

fn weight(kind: ValueKind, listed: &[ValueKind]) -> u64 {
    listed
        .iter()
        .enumerate()
        .filter(|(_, t)| kind.is_subtype_of(**t))
        .map(|(i, _)| 1u64 << i.min(63))
        .sum()
}

impl fmt::Debug for Conversions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|c| c.source))
            .finish()
    }
}

/// Reads byte strings and booleans as integers.
pub fn to_int(value: Value) -> ConvertResult {
    match value {
        Value::Bytes(ref bytes) => bytes_to_int(bytes)
            .map(Value::Int)
            .ok_or_else(|| format!("{} bytes do not fit in an integer", bytes.len())),
        Value::Bool(b) => Ok(Value::Int(u64::from(b))),
        other => Ok(other),
    }
}

/// Maps booleans to `0` / `1`.
pub fn bool_to_int(value: Value) -> ConvertResult {
    match value {
        Value::Bool(b) => Ok(Value::Int(u64::from(b))),
        other => Ok(other),
    }
}
