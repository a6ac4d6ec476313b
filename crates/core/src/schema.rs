//! Ordered field lists shared by every container of a kind.

use std::collections::HashMap;

use tracing::warn;

use crate::bits::get_bits;
use crate::error::{Error, Result};
use crate::field::{Field, FieldBuilder};
use crate::hidpp::Envelope;

/// Immutable, ordered list of field descriptors.
#[derive(Debug)]
pub struct Schema {
    name: &'static str,
    fields: Vec<Field>,
    envelope: Option<Envelope>,
    versions: Vec<u8>,
    lookup: HashMap<&'static str, usize>,
}

impl Schema {
    pub fn builder(name: &'static str) -> SchemaBuilder {
        SchemaBuilder {
            name,
            fields: Vec::new(),
            envelope: None,
            versions: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// HID++ framing, for schemas describing a whole report.
    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_ref()
    }

    /// Feature versions this layout applies to. Empty means every version.
    pub fn versions(&self) -> &[u8] {
        &self.versions
    }

    /// Index of the field with this canonical name or alias.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|idx| &self.fields[idx])
    }

    /// Index of the field `name` would match if case were ignored.
    pub fn confusable(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.confusing(name))
    }

    /// Whether an element of this schema may start at `offset`.
    ///
    /// Only a leading tag is inspected; untagged schemas accept anything.
    pub fn accepts(&self, data: &[u8], offset: usize, limit: usize) -> bool {
        match self.fields.first() {
            Some(first) if first.has_tag() => {
                offset + first.fid_length() <= limit
                    && get_bits(data, offset, first.fid_length()).ok() == first.fid()
            }
            _ => true,
        }
    }

    /// Pairs of names from different fields that only differ by case.
    pub fn lint(&self) -> Vec<String> {
        let mut findings = Vec::new();
        for (i, a) in self.fields.iter().enumerate() {
            for b in &self.fields[i + 1..] {
                let names_b: Vec<&str> = std::iter::once(b.name())
                    .chain(b.aliases().iter().copied())
                    .collect();
                for name in std::iter::once(a.name()).chain(a.aliases().iter().copied()) {
                    if let Some(other) = names_b.iter().find(|n| n.eq_ignore_ascii_case(name)) {
                        findings.push(format!(
                            "{}: {name:?} ({}) and {other:?} ({}) differ only by case",
                            self.name,
                            a.name(),
                            b.name()
                        ));
                    }
                }
            }
        }
        findings
    }
}

pub struct SchemaBuilder {
    name: &'static str,
    fields: Vec<FieldBuilder>,
    envelope: Option<Envelope>,
    versions: Vec<u8>,
}

impl SchemaBuilder {
    pub fn field(mut self, field: FieldBuilder) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldBuilder>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn version(mut self, version: u8) -> Self {
        self.versions.push(version);
        self
    }

    pub(crate) fn envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    pub fn build(self) -> Result<Schema> {
        let fields = self
            .fields
            .into_iter()
            .map(FieldBuilder::build)
            .collect::<Result<Vec<_>>>()?;

        let mut lookup = HashMap::new();
        for (idx, field) in fields.iter().enumerate() {
            for name in std::iter::once(field.name()).chain(field.aliases().iter().copied()) {
                if lookup.insert(name, idx).is_some() {
                    return Err(Error::InvalidSchema {
                        name: format!("{}.{name}", self.name),
                        origin: field.origin(),
                        reason: "name is declared twice".into(),
                    });
                }
            }
        }

        let schema = Schema {
            name: self.name,
            fields,
            envelope: self.envelope,
            versions: self.versions,
            lookup,
        };
        for finding in schema.lint() {
            warn!(schema = schema.name, "{finding}");
        }
        Ok(schema)
    }
}

/// Builds a schema declared in a `lazy_static` block.
///
/// Static declarations are fixed at compile time and every one of them is
/// built by the test suite, so a failure here is a programming error.
pub(crate) fn declare(built: Result<Schema>) -> Schema {
    built.unwrap_or_else(|err| panic!("static schema is invalid: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_alias() {
        let schema = Schema::builder("BitMap")
            .field(Field::bits("reserved", 7))
            .field(Field::bits("gothard", 1).alias("gotthard"))
            .build()
            .unwrap();
        assert_eq!(schema.index_of("gothard"), Some(1));
        assert_eq!(schema.index_of("gotthard"), Some(1));
        assert_eq!(schema.index_of("Gothard"), None);
        assert_eq!(schema.confusable("Gothard"), Some(1));
        assert_eq!(schema.confusable("unknown"), None);
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = Schema::builder("Dup")
            .field(Field::bits("a", 4))
            .field(Field::bits("b", 4).alias("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchema { .. }));
    }

    #[test]
    fn lint_reports_case_collisions() {
        let schema = Schema::builder("Confusing")
            .field(Field::bits("mode", 4))
            .field(Field::bits("Mode", 4))
            .build()
            .unwrap();
        let findings = schema.lint();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("differ only by case"));
    }

    #[test]
    fn accepts_checks_leading_tag() {
        let schema = Schema::builder("Tlv")
            .field(Field::bits("kind", 4).tag(0xA, 4))
            .build()
            .unwrap();
        assert!(schema.accepts(&[0xA0], 0, 8));
        assert!(!schema.accepts(&[0xB0], 0, 8));
        assert!(!schema.accepts(&[0xA0], 6, 8));
    }
}
