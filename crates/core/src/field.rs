//! Field descriptors.
//!
//! A [`Field`] describes one slot of a container: where it sits on the wire,
//! how long it is, which values it accepts and how assigned values are
//! converted. Descriptors are built once with [`FieldBuilder`] and shared by
//! every container of a schema.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::bits::{bit_width, copy_bits, get_bits, mask, BitWriter};
use crate::check::Check;
use crate::codec::{self, DecodeOptions, FieldParser};
use crate::container::Container;
use crate::convert::{Conversion, Conversions};
use crate::error::{Error, Origin, Result};
use crate::schema::Schema;
use crate::value::{minimal_bytes, Value, ValueKind};

/// Callback evaluated against the container holding the field.
pub type ContainerFn<T> = Arc<dyn Fn(&Container) -> T + Send + Sync>;

/// Bit length of a field's value.
#[derive(Clone)]
pub enum Length {
    Fixed(usize),
    /// Computed from sibling fields. `None` means "unknown".
    FromContainer(ContainerFn<Option<usize>>),
    /// Everything up to the parse limit.
    Remainder,
}

#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    FromContainer(ContainerFn<Value>),
}

#[derive(Clone)]
pub enum Optionality {
    Fixed(bool),
    FromContainer(ContainerFn<bool>),
}

/// Unit counted by a length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    Bits,
    Bytes,
}

impl LengthUnit {
    /// Bits covered by `units`, `None` when that does not fit a `usize`.
    pub fn to_bits(self, units: usize) -> Option<usize> {
        match self {
            LengthUnit::Bits => Some(units),
            LengthUnit::Bytes => units.checked_mul(8),
        }
    }

    /// Units needed to cover `bits`, rounded up.
    pub fn from_bits(self, bits: usize) -> usize {
        match self {
            LengthUnit::Bits => bits,
            LengthUnit::Bytes => bits.div_ceil(8),
        }
    }
}

/// Parse flavour of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserKind {
    /// Length prefixes count bytes; remainders stop on a byte boundary.
    #[default]
    Byte,
    /// Length prefixes count bits; remainders are taken bit-exact.
    Bit,
}

impl ParserKind {
    pub fn strategy(self) -> &'static dyn FieldParser {
        match self {
            ParserKind::Byte => &codec::ByteParser,
            ParserKind::Bit => &codec::BitParser,
        }
    }
}

/// Schemas parsed recursively out of a field's bits.
#[derive(Clone)]
pub enum Nested {
    Single(&'static Schema),
    /// Back-to-back elements; each one is parsed with the first candidate
    /// whose leading tag matches.
    Sequence(Vec<&'static Schema>),
}

/// Immutable field descriptor.
#[derive(Clone)]
pub struct Field {
    name: &'static str,
    title: &'static str,
    aliases: Vec<&'static str>,
    fid: Option<u64>,
    fid_length: usize,
    value_length: Length,
    len_length: usize,
    length_unit: Option<LengthUnit>,
    default: Option<DefaultValue>,
    checks: Vec<Check>,
    conversions: Conversions,
    optional: Optionality,
    interpreter: BTreeMap<u64, &'static str>,
    parser: ParserKind,
    nested: Option<Nested>,
    padding: bool,
    zero_print: bool,
    origin: Origin,
}

impl Field {
    /// Field of `count` bits.
    #[track_caller]
    pub fn bits(name: &'static str, count: usize) -> FieldBuilder {
        FieldBuilder::new(name, Length::Fixed(count), Origin::caller())
    }

    /// Field of `count` whole bytes.
    #[track_caller]
    pub fn bytes(name: &'static str, count: usize) -> FieldBuilder {
        FieldBuilder::new(name, Length::Fixed(count * 8), Origin::caller())
    }

    /// Field running to the parse limit, or sized by its length prefix.
    #[track_caller]
    pub fn remainder(name: &'static str) -> FieldBuilder {
        FieldBuilder::new(name, Length::Remainder, Origin::caller())
    }

    /// Field whose bit length is computed from its siblings.
    #[track_caller]
    pub fn computed(
        name: &'static str,
        length: impl Fn(&Container) -> Option<usize> + Send + Sync + 'static,
    ) -> FieldBuilder {
        FieldBuilder::new(
            name,
            Length::FromContainer(Arc::new(length)),
            Origin::caller(),
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn title(&self) -> &'static str {
        self.title
    }

    pub fn aliases(&self) -> &[&'static str] {
        &self.aliases
    }

    pub fn fid(&self) -> Option<u64> {
        self.fid
    }

    pub fn fid_length(&self) -> usize {
        self.fid_length
    }

    pub fn len_length(&self) -> usize {
        self.len_length
    }

    pub fn value_length(&self) -> &Length {
        &self.value_length
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn conversions(&self) -> &Conversions {
        &self.conversions
    }

    pub fn parser(&self) -> ParserKind {
        self.parser
    }

    pub fn nested(&self) -> Option<&Nested> {
        self.nested.as_ref()
    }

    pub fn is_padding(&self) -> bool {
        self.padding
    }

    pub fn zero_print(&self) -> bool {
        self.zero_print
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Label for an integer value, if the field has one.
    pub fn interpret(&self, value: &Value) -> Option<&'static str> {
        value
            .as_int()
            .and_then(|v| self.interpreter.get(&v).copied())
    }

    /// Whether `name` is the canonical name or an alias.
    pub fn acceptable(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }

    /// Whether `name` differs from an acceptable name only by case.
    pub fn confusing(&self, name: &str) -> bool {
        !self.acceptable(name)
            && std::iter::once(&self.name)
                .chain(self.aliases.iter())
                .any(|known| known.eq_ignore_ascii_case(name))
    }

    pub fn is_optional(&self, container: &Container) -> bool {
        match &self.optional {
            Optionality::Fixed(optional) => *optional,
            Optionality::FromContainer(f) => f(container),
        }
    }

    pub fn has_tag(&self) -> bool {
        self.fid_length > 0
    }

    /// Whether the value is preceded by a length prefix.
    pub fn variable(&self) -> bool {
        self.len_length > 0
    }

    /// Unit counted by the length prefix.
    pub fn length_unit(&self) -> LengthUnit {
        self.length_unit
            .unwrap_or_else(|| self.parser.strategy().default_unit())
    }

    /// Declared bit length of the value, when known without reading data.
    pub fn resolve_length(&self, container: &Container) -> Option<usize> {
        match &self.value_length {
            Length::Fixed(bits) => Some(*bits),
            Length::FromContainer(f) => f(container),
            Length::Remainder => None,
        }
    }

    /// Bit length suggested by a conversion's length hint for the value
    /// starting at `offset`.
    pub fn hinted_length(&self, data: &[u8], offset: usize, limit: usize) -> Option<usize> {
        self.conversions
            .length_hint(ValueKind::Bytes)
            .and_then(|hint| hint(data, offset, limit))
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_value(&self, container: &Container) -> Option<Value> {
        match self.default.as_ref()? {
            DefaultValue::Literal(v) => Some(v.clone()),
            DefaultValue::FromContainer(f) => Some(f(container)),
        }
    }

    pub(crate) fn has_literal_default(&self) -> bool {
        matches!(self.default, Some(DefaultValue::Literal(_)))
    }

    /// Accepts `value` if any check does, or if the field has no checks.
    /// An absent value passes only for optional fields.
    pub fn check_value(&self, value: Option<&Value>, container: Option<&Container>) -> Result<()> {
        let Some(value) = value else {
            if container.is_some_and(|c| self.is_optional(c)) {
                return Ok(());
            }
            return Err(self.invalid("value is absent"));
        };
        if self.checks.is_empty() || self.checks.iter().any(|c| c.accepts(value)) {
            return Ok(());
        }
        Err(self.invalid(format!("{value} rejected by {:?}", self.checks)))
    }

    pub fn convert_value(&self, value: Value, container: Option<&Container>) -> Result<Value> {
        self.conversions
            .apply(value, container)
            .map_err(|reason| self.invalid(reason))
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidValue {
            field: self.name.to_string(),
            origin: self.origin,
            reason: reason.into(),
        }
    }

    pub(crate) fn overflow(&self, bits: usize, detail: impl Into<String>) -> Error {
        Error::ValueOverflow {
            field: self.name.to_string(),
            origin: self.origin,
            bits,
            detail: detail.into(),
        }
    }

    /// Rejects integers wider than the declared length before any check runs.
    pub(crate) fn precheck_width(&self, value: &Value, length: Option<usize>) -> Result<()> {
        if self.nested.is_some() {
            return Ok(());
        }
        match (value, length) {
            (Value::Int(v), Some(bits)) if bit_width(*v) > bits => {
                Err(self.overflow(bits, format!("0x{v:X}")))
            }
            _ => Ok(()),
        }
    }

    /// `value` as a left-aligned buffer holding exactly `bits` bits.
    ///
    /// Integers and byte strings are read as big-endian numbers; leading
    /// zero bits may be dropped, anything else that does not fit overflows.
    pub(crate) fn align_raw(&self, value: &Value, bits: usize) -> Result<Vec<u8>> {
        let mut writer = BitWriter::new();
        match value {
            Value::Bool(b) => writer
                .push_int(bits, u64::from(*b))
                .map_err(|_| self.overflow(bits, b.to_string()))?,
            Value::Int(v) => writer
                .push_int(bits, *v)
                .map_err(|_| self.overflow(bits, format!("0x{v:X}")))?,
            Value::Bytes(bytes) => {
                let have = bytes.len() * 8;
                if have <= bits {
                    writer.push_zeros(bits - have);
                    writer.push_bytes(bytes)?;
                } else {
                    let extra = have - bits;
                    let leading_zero = (0..extra)
                        .step_by(64)
                        .map(|at| get_bits(bytes, at, (extra - at).min(64)))
                        .try_fold(true, |zero, word| word.map(|w| zero && w == 0))?;
                    if !leading_zero {
                        return Err(self.overflow(bits, format!("{} bytes", bytes.len())));
                    }
                    writer.push_slice(bytes, extra, bits)?;
                }
            }
            Value::Container(_) | Value::Sequence(_) => {
                return Err(self.invalid("containers have no raw form"))
            }
        }
        Ok(writer.into_bytes())
    }

    /// Brings `value` to the single representation stored in containers.
    ///
    /// With a known length: whole-byte lengths hold `Bytes`, other lengths up
    /// to 64 bits hold `Int`. With an unknown length, byte strings are kept and
    /// integers follow the length unit. Nested fields hold containers.
    pub(crate) fn canonicalize(&self, value: Value, length: Option<usize>) -> Result<Value> {
        match (&self.nested, value) {
            (Some(Nested::Single(schema)), Value::Container(c)) => {
                if std::ptr::eq(c.schema(), *schema) {
                    Ok(Value::Container(c))
                } else {
                    Err(self.invalid(format!(
                        "expected a {} container, got {}",
                        schema.name(),
                        c.schema().name()
                    )))
                }
            }
            (Some(Nested::Single(schema)), raw) => {
                let bits = match length {
                    Some(bits) => bits,
                    None => match &raw {
                        Value::Bytes(bytes) => bytes.len() * 8,
                        _ => return Err(self.invalid("nested value needs a known length")),
                    },
                };
                let aligned = self.align_raw(&raw, bits)?;
                let (container, _) =
                    codec::decode(*schema, &aligned, 0, Some(bits), DecodeOptions::default())?;
                Ok(Value::from(container))
            }
            (Some(Nested::Sequence(candidates)), Value::Sequence(items)) => {
                if let Some(stray) = items
                    .iter()
                    .find(|item| !candidates.iter().any(|s| std::ptr::eq(item.schema(), *s)))
                {
                    return Err(self.invalid(format!(
                        "{} is not an element schema",
                        stray.schema().name()
                    )));
                }
                Ok(Value::Sequence(items))
            }
            (Some(Nested::Sequence(candidates)), Value::Bytes(bytes)) => {
                let items = codec::decode_sequence(
                    self,
                    candidates,
                    &bytes,
                    0..bytes.len() * 8,
                    DecodeOptions::default(),
                )?;
                Ok(Value::Sequence(items))
            }
            (Some(Nested::Sequence(_)), other) => {
                Err(self.invalid(format!("{other} is not a sequence")))
            }
            (None, Value::Container(_) | Value::Sequence(_)) => {
                Err(self.invalid("field does not hold containers"))
            }
            (None, Value::Bool(b)) => self.canonicalize(Value::Int(u64::from(b)), length),
            (None, raw) => match length {
                Some(bits) => {
                    let aligned = self.align_raw(&raw, bits)?;
                    if bits % 8 == 0 {
                        Ok(Value::Bytes(aligned))
                    } else if bits <= 64 {
                        Ok(Value::Int(get_bits(&aligned, 0, bits)?))
                    } else {
                        Ok(Value::Bytes(copy_bits(&aligned, 0, bits)?))
                    }
                }
                None => Ok(match raw {
                    Value::Int(v) => match self.length_unit() {
                        LengthUnit::Bytes => Value::Bytes(minimal_bytes(v)),
                        LengthUnit::Bits if bit_width(v).max(1) % 8 == 0 => {
                            Value::Bytes(minimal_bytes(v))
                        }
                        LengthUnit::Bits => Value::Int(v),
                    },
                    other => other,
                }),
            },
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Field");
        s.field("name", &self.name);
        if let Some(fid) = self.fid {
            s.field("fid", &format_args!("0x{fid:X}"));
        }
        match &self.value_length {
            Length::Fixed(bits) => s.field("bits", bits),
            Length::FromContainer(_) => s.field("bits", &"computed"),
            Length::Remainder => s.field("bits", &"remainder"),
        };
        s.field("origin", &self.origin).finish_non_exhaustive()
    }
}

/// Builder for [`Field`].
///
/// ```
/// use hidpp_codec_core::field::Field;
///
/// let field = Field::bits("gothard", 1)
///     .title("Gothard")
///     .alias("gotthard")
///     .default(0u8)
///     .build()
///     .unwrap();
/// assert!(field.acceptable("gotthard"));
/// ```
pub struct FieldBuilder {
    field: Field,
    optional: Option<Optionality>,
    conversions: Vec<Conversion>,
}

impl FieldBuilder {
    fn new(name: &'static str, value_length: Length, origin: Origin) -> Self {
        Self {
            field: Field {
                name,
                title: name,
                aliases: Vec::new(),
                fid: None,
                fid_length: 0,
                value_length,
                len_length: 0,
                length_unit: None,
                default: None,
                checks: Vec::new(),
                conversions: Conversions::default(),
                optional: Optionality::Fixed(false),
                interpreter: BTreeMap::new(),
                parser: ParserKind::default(),
                nested: None,
                padding: false,
                zero_print: false,
                origin,
            },
            optional: None,
            conversions: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.field.name
    }

    /// Bits the field always occupies on the wire, when that is constant.
    pub fn wire_bits(&self) -> Option<usize> {
        match self.field.value_length {
            Length::Fixed(bits) => Some(self.field.fid_length + self.field.len_length + bits),
            _ => None,
        }
    }

    pub fn title(mut self, title: &'static str) -> Self {
        self.field.title = title;
        self
    }

    /// Identifier of the field. With a non-zero `fid_length` it is also
    /// written as a tag in front of the value.
    pub fn tag(mut self, fid: u64, fid_length: usize) -> Self {
        self.field.fid = Some(fid);
        self.field.fid_length = fid_length;
        self
    }

    /// Prefixes the value with its length on `len_length` bits.
    pub fn variable(mut self, len_length: usize) -> Self {
        self.field.len_length = len_length;
        self
    }

    pub fn unit(mut self, unit: LengthUnit) -> Self {
        self.field.length_unit = Some(unit);
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.field.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_with(
        mut self,
        f: impl Fn(&Container) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.field.default = Some(DefaultValue::FromContainer(Arc::new(f)));
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.field.checks.push(check);
        self
    }

    pub fn conversion(mut self, conversion: Conversion) -> Self {
        self.conversions.push(conversion);
        self
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.field.aliases.push(alias);
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = Some(Optionality::Fixed(optional));
        self
    }

    pub fn optional_when(
        mut self,
        predicate: impl Fn(&Container) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.optional = Some(Optionality::FromContainer(Arc::new(predicate)));
        self
    }

    pub fn interpret(mut self, labels: &[(u64, &'static str)]) -> Self {
        self.field.interpreter.extend(labels.iter().copied());
        self
    }

    pub fn parser(mut self, parser: ParserKind) -> Self {
        self.field.parser = parser;
        self
    }

    pub fn nested(mut self, schema: &'static Schema) -> Self {
        self.field.nested = Some(Nested::Single(schema));
        self
    }

    pub fn sequence(mut self, candidates: Vec<&'static Schema>) -> Self {
        self.field.nested = Some(Nested::Sequence(candidates));
        self
    }

    /// Marks the field as filler: zero by default, ignored by equality.
    pub fn padding(mut self) -> Self {
        self.field.padding = true;
        if self.field.default.is_none() {
            self.field.default = Some(DefaultValue::Literal(Value::Int(0)));
        }
        self
    }

    /// Keeps the field in summaries when its value is zero.
    pub fn zero_print(mut self) -> Self {
        self.field.zero_print = true;
        self
    }

    pub fn build(self) -> Result<Field> {
        let FieldBuilder {
            mut field,
            optional,
            conversions,
        } = self;
        field.conversions = Conversions::new(conversions);

        let schema_error = |reason: String| Error::InvalidSchema {
            name: field.name.to_string(),
            origin: field.origin,
            reason,
        };
        if field.fid_length > 64 || field.len_length > 64 {
            return Err(schema_error("tags and length prefixes are limited to 64 bits".into()));
        }
        if field.has_tag() {
            let fid = field
                .fid
                .ok_or_else(|| schema_error("tagged field without a fid".into()))?;
            if bit_width(fid) > field.fid_length {
                return Err(schema_error(format!(
                    "fid 0x{fid:X} does not fit in {} bits",
                    field.fid_length
                )));
            }
        }
        if let (true, Length::Fixed(bits)) = (field.variable(), &field.value_length) {
            let units = field.length_unit().from_bits(*bits) as u64;
            if units > mask(field.len_length) {
                return Err(schema_error(format!(
                    "length {units} does not fit in a {}-bit prefix",
                    field.len_length
                )));
            }
        }

        field.optional = optional.unwrap_or_else(|| {
            let empty = matches!(field.value_length, Length::Fixed(0)) && field.len_length == 0;
            Optionality::Fixed(empty)
        });

        if let Some(DefaultValue::Literal(value)) = field.default.as_ref() {
            if !(field.padding && *value == Value::Int(0)) {
                let length = match field.value_length {
                    Length::Fixed(bits) => Some(bits),
                    _ => None,
                };
                field.precheck_width(value, length)?;
                field.check_value(Some(value), None)?;
                let converted = field.convert_value(value.clone(), None)?;
                field.default = Some(DefaultValue::Literal(converted));
            }
        }

        Ok(field)
    }
}

/// Default that counts the encoded bytes of sibling fields, plus `delta`.
///
/// Absent siblings count as zero. Meant for length fields that precede the
/// values they describe.
pub fn field_length(
    names: &'static [&'static str],
    delta: i64,
) -> impl Fn(&Container) -> Value + Send + Sync + 'static {
    move |container| {
        let total: i64 = names
            .iter()
            .filter_map(|name| container.encoded_len(name).ok())
            .map(|bits| bits.div_ceil(8) as i64)
            .sum();
        Value::Int((total + delta).max(0) as u64)
    }
}
