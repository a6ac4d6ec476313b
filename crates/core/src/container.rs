//! Containers: schema-typed value records.

use std::fmt;
use std::fmt::Write as _;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::warn;

use crate::codec::{self, DecodeOptions};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::schema::Schema;
use crate::value::{to_hex, Value};

/// One value slot per field of a schema.
#[derive(Clone)]
pub struct Container {
    schema: &'static Schema,
    values: Vec<Option<Value>>,
}

impl Container {
    /// A container with every slot unset. Defaults are not applied.
    pub fn empty(schema: &'static Schema) -> Self {
        Self {
            schema,
            values: vec![None; schema.fields().len()],
        }
    }

    /// Builds a container from named values.
    ///
    /// Named values are assigned in field order, then defaults fill the
    /// remaining slots. Fails with [`Error::MissingField`] if a mandatory
    /// field is still unset.
    pub fn new<'a>(
        schema: &'static Schema,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<Self> {
        let mut container = Self::empty(schema);
        let mut assigned = values
            .into_iter()
            .map(|(name, value)| Ok((container.index_for_write(name)?, value)))
            .collect::<Result<Vec<_>>>()?;
        assigned.sort_by_key(|(idx, _)| *idx);
        for (idx, value) in assigned {
            container.assign(idx, value)?;
        }

        // Literal defaults first, so computed ones see every sibling.
        for computed in [false, true] {
            for (idx, field) in schema.fields().iter().enumerate() {
                if container.values[idx].is_some()
                    || !field.has_default()
                    || field.has_literal_default() == computed
                {
                    continue;
                }
                let Some(value) = field.default_value(&container) else {
                    continue;
                };
                if computed {
                    container.assign(idx, value)?;
                } else {
                    let length = field.resolve_length(&container);
                    container.values[idx] = Some(field.canonicalize(value, length)?);
                }
            }
        }

        if let Some(field) = schema
            .fields()
            .iter()
            .zip(&container.values)
            .find(|(field, value)| value.is_none() && !field.is_optional(&container))
            .map(|(field, _)| field)
        {
            return Err(container.missing(field));
        }
        Ok(container)
    }

    /// Builds a container holding only defaults.
    pub fn with_defaults(schema: &'static Schema) -> Result<Self> {
        Self::new(schema, std::iter::empty())
    }

    /// Decodes a whole buffer.
    pub fn from_bytes(
        schema: &'static Schema,
        data: &[u8],
        options: DecodeOptions,
    ) -> Result<Self> {
        codec::decode(schema, data, 0, None, options).map(|(container, _)| container)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn name(&self) -> &'static str {
        self.schema.name()
    }

    /// Fields paired with their current values.
    pub fn iter(&self) -> impl Iterator<Item = (&'static Field, Option<&Value>)> + '_ {
        let schema = self.schema;
        schema.fields().iter().zip(self.values.iter().map(Option::as_ref))
    }

    pub fn value_at(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx).and_then(Option::as_ref)
    }

    /// Reads a field by canonical name or alias.
    ///
    /// A name that only differs by case from a known one logs a warning and
    /// still reads that field.
    pub fn get(&self, name: &str) -> Result<Option<&Value>> {
        let idx = self.index_for_read(name)?;
        Ok(self.values[idx].as_ref())
    }

    /// Reads a present field as an integer.
    pub fn get_int(&self, name: &str) -> Result<u64> {
        let idx = self.index_for_read(name)?;
        let field = &self.schema.fields()[idx];
        let value = self.values[idx]
            .as_ref()
            .ok_or_else(|| self.missing(field))?;
        value
            .as_int()
            .ok_or_else(|| field.invalid(format!("{value} is not an integer")))
    }

    /// Reads a present nested container.
    pub fn get_container(&self, name: &str) -> Result<&Container> {
        let idx = self.index_for_read(name)?;
        let field = &self.schema.fields()[idx];
        let value = self.values[idx]
            .as_ref()
            .ok_or_else(|| self.missing(field))?;
        value
            .as_container()
            .ok_or_else(|| field.invalid(format!("{value} is not a container")))
    }

    /// Writes a field by canonical name or alias, running checks and
    /// conversions.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let idx = self.index_for_write(name)?;
        self.assign(idx, value.into())
    }

    /// Clears an optional field.
    pub fn unset(&mut self, name: &str) -> Result<()> {
        let idx = self.index_for_write(name)?;
        let field = &self.schema.fields()[idx];
        if !field.is_optional(self) {
            return Err(field.invalid("mandatory fields cannot be unset"));
        }
        self.values[idx] = None;
        Ok(())
    }

    /// Bit offset of a field's value within the encoded container, past its
    /// tag and length prefix.
    pub fn field_offset(&self, name: &str) -> Result<usize> {
        let target = self.index_for_read(name)?;
        let mut offset = 0;
        for (idx, (field, value)) in self.iter().enumerate() {
            if idx == target {
                let mut header = 0;
                if field.has_tag() {
                    header += field.fid_length();
                }
                if field.variable() {
                    header += field.len_length();
                }
                return Ok(offset + header);
            }
            if let Some(value) = value {
                offset += codec::field_bits(field, self, value)?;
            }
        }
        Ok(offset)
    }

    /// Encoded bit length of a field's value, without tag or length prefix.
    pub fn encoded_len(&self, name: &str) -> Result<usize> {
        let idx = self.index_for_read(name)?;
        let field = &self.schema.fields()[idx];
        match &self.values[idx] {
            Some(value) => codec::value_bits(field, self, value),
            None => Ok(0),
        }
    }

    /// Multi-line human readable rendering.
    ///
    /// Zero values are skipped unless their field asks to be printed.
    pub fn summary(&self) -> String {
        let mut out = match self.to_bytes() {
            Ok(bytes) => format!("{}: {}\n", self.name(), to_hex(&bytes)),
            Err(_) => format!("{}\n", self.name()),
        };
        self.write_summary(&mut out, 1);
        out
    }

    fn write_summary(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        for (field, value) in self.iter() {
            let Some(value) = value else { continue };
            if value.is_zero() && !field.zero_print() {
                continue;
            }
            let _ = write!(out, "{indent}- {}: ", field.title());
            if let Some(fid) = field.fid().filter(|_| field.has_tag()) {
                let _ = write!(out, "(0x{fid:X}) ");
            }
            match value {
                Value::Container(inner) => {
                    let _ = writeln!(out, "{}", inner.name());
                    inner.write_summary(out, depth + 1);
                }
                Value::Sequence(items) => {
                    let _ = writeln!(out, "{} item(s)", items.len());
                    for item in items {
                        let _ = writeln!(out, "{indent}  {}", item.name());
                        item.write_summary(out, depth + 2);
                    }
                }
                other => match field.interpret(other) {
                    Some(label) => {
                        let _ = writeln!(out, "{other} ({label})");
                    }
                    None => {
                        let _ = writeln!(out, "{other}");
                    }
                },
            }
        }
    }

    /// JSON object keyed by canonical field names. Padding is left out.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub(crate) fn assign(&mut self, idx: usize, value: Value) -> Result<()> {
        let schema = self.schema;
        let field = &schema.fields()[idx];
        let length = field.resolve_length(self);
        field.precheck_width(&value, length)?;
        field.check_value(Some(&value), Some(self))?;
        let value = field.convert_value(value, Some(self))?;
        self.values[idx] = Some(field.canonicalize(value, length)?);
        Ok(())
    }

    /// Stores a value read from the wire. `bits` is the length it occupied.
    pub(crate) fn store_parsed(
        &mut self,
        idx: usize,
        value: Value,
        bits: usize,
        strict: bool,
    ) -> Result<()> {
        let schema = self.schema;
        let field = &schema.fields()[idx];
        let value = field.canonicalize(value, Some(bits))?;
        if strict && !field.is_padding() {
            field.check_value(Some(&value), Some(self))?;
        }
        self.values[idx] = Some(value);
        Ok(())
    }

    fn index_for_read(&self, name: &str) -> Result<usize> {
        if let Some(idx) = self.schema.index_of(name) {
            return Ok(idx);
        }
        if let Some(idx) = self.schema.confusable(name) {
            let canonical = self.schema.fields()[idx].name();
            warn!(
                container = self.name(),
                requested = name,
                field = canonical,
                "field name differs from declaration only by case"
            );
            return Ok(idx);
        }
        Err(self.unknown(name, None))
    }

    fn index_for_write(&self, name: &str) -> Result<usize> {
        if let Some(idx) = self.schema.index_of(name) {
            return Ok(idx);
        }
        let suggestion = self
            .schema
            .confusable(name)
            .map(|idx| self.schema.fields()[idx].name().to_string());
        Err(self.unknown(name, suggestion))
    }

    fn unknown(&self, name: &str, suggestion: Option<String>) -> Error {
        Error::UnknownField {
            container: self.name().to_string(),
            name: name.to_string(),
            suggestion,
        }
    }

    pub(crate) fn missing(&self, field: &Field) -> Error {
        Error::MissingField {
            container: self.name().to_string(),
            field: field.name().to_string(),
            origin: field.origin(),
        }
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.schema, other.schema)
            && self
                .iter()
                .zip(other.values.iter())
                .all(|((field, a), b)| field.is_padding() || a == b.as_ref())
    }
}

impl Eq for Container {}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.name())?;
        let mut first = true;
        for (field, value) in self.iter() {
            let Some(value) = value else { continue };
            f.write_str(if first { " " } else { ", " })?;
            first = false;
            if let Some(fid) = field.fid().filter(|_| field.has_tag()) {
                write!(f, "(0x{fid:X}) ")?;
            }
            write!(f, "{}: {value}", field.title())?;
        }
        f.write_str(if first { "}" } else { " }" })
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in self.iter() {
            map.entry(&field.name(), &value);
        }
        map.finish()
    }
}

impl Serialize for Container {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let present: Vec<_> = self
            .iter()
            .filter(|(field, value)| value.is_some() && !field.is_padding())
            .collect();
        let mut map = serializer.serialize_map(Some(present.len()))?;
        for (field, value) in present {
            map.serialize_entry(field.name(), &value)?;
        }
        map.end()
    }
}
