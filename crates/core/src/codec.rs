//! Encoding and decoding of containers.
//!
//! Every field is laid out as `[tag][length prefix][value]`, where the tag
//! and prefix are only present when the field declares them. Offsets and
//! limits are counted in bits.

use std::ops::Range;

use tracing::{debug, trace};

use crate::bits::{bit_width, copy_bits, get_bits, BitWriter};
use crate::container::Container;
use crate::error::{Error, Result};
use crate::field::{Field, LengthUnit, Nested};
use crate::schema::Schema;
use crate::value::{minimal_bytes, Value};

/// Decoding behaviour for truncated input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// When false, fields cut short by the end of input get whatever bits
    /// remain instead of failing. Framing and overflow errors still fail.
    pub strict: bool,
}

impl DecodeOptions {
    pub fn lenient() -> Self {
        Self { strict: false }
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Value located by a parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// Bits occupied by the value, without tag or length prefix.
    pub range: Range<usize>,
    pub raw: Value,
}

/// Outcome of parsing one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    /// Offset following the field; equals the start offset when absent.
    pub end: usize,
    pub value: Option<Located>,
}

/// Strategy used to read one field from a bit stream.
pub trait FieldParser: Sync {
    /// Unit of length prefixes for fields that do not declare one.
    fn default_unit(&self) -> LengthUnit;

    /// Bits consumed by a field that runs to `limit`.
    fn remainder_bits(&self, offset: usize, limit: usize) -> usize;

    fn parse(
        &self,
        field: &Field,
        container: &Container,
        data: &[u8],
        offset: usize,
        limit: usize,
        options: DecodeOptions,
    ) -> Result<Parsed> {
        parse_field(self, field, container, data, offset, limit, options)
    }
}

/// Byte-oriented parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteParser;

impl FieldParser for ByteParser {
    fn default_unit(&self) -> LengthUnit {
        LengthUnit::Bytes
    }

    fn remainder_bits(&self, offset: usize, limit: usize) -> usize {
        (limit - offset) / 8 * 8
    }
}

/// Bit-oriented parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitParser;

impl FieldParser for BitParser {
    fn default_unit(&self) -> LengthUnit {
        LengthUnit::Bits
    }

    fn remainder_bits(&self, offset: usize, limit: usize) -> usize {
        limit - offset
    }
}

/// Reads `count` bits as a value: whole bytes become `Bytes`, anything
/// else up to 64 bits becomes `Int`.
pub fn extract(data: &[u8], offset: usize, count: usize) -> Result<Value> {
    if count == 0 {
        return Ok(Value::Bytes(Vec::new()));
    }
    if count % 8 == 0 || count > 64 {
        Ok(Value::Bytes(copy_bits(data, offset, count)?))
    } else {
        Ok(Value::Int(get_bits(data, offset, count)?))
    }
}

fn parse_error(container: &Container, field: &Field, reason: String) -> Error {
    Error::ParseError {
        container: container.name().to_string(),
        field: field.name().to_string(),
        origin: field.origin(),
        reason,
    }
}

fn parse_field<P: FieldParser + ?Sized>(
    parser: &P,
    field: &Field,
    container: &Container,
    data: &[u8],
    offset: usize,
    limit: usize,
    options: DecodeOptions,
) -> Result<Parsed> {
    let absent = || Parsed {
        end: offset,
        value: None,
    };
    let empty_at = |at: usize| Parsed {
        end: at,
        value: Some(Located {
            range: at..at,
            raw: Value::Bytes(Vec::new()),
        }),
    };

    if offset >= limit {
        if field.is_optional(container) {
            debug!(
                container = container.name(),
                field = field.name(),
                offset,
                "optional field absent at end of input"
            );
            return Ok(absent());
        }
        let needs_bits = field.has_tag()
            || field.variable()
            || field.resolve_length(container).map_or(false, |bits| bits > 0);
        if needs_bits && options.strict {
            return Err(container.missing(field));
        }
        return Ok(empty_at(offset));
    }

    // Tag and length prefix are all-or-nothing.
    let truncated = |what: &str, needed: usize| -> Result<Parsed> {
        if field.is_optional(container) {
            Ok(absent())
        } else if options.strict {
            Err(parse_error(
                container,
                field,
                format!("{what} needs {needed} bits, {} left", limit - offset),
            ))
        } else {
            Ok(empty_at(limit))
        }
    };

    let mut cursor = offset;
    if field.has_tag() {
        if cursor + field.fid_length() > limit {
            return truncated("tag", field.fid_length());
        }
        let tag = get_bits(data, cursor, field.fid_length())?;
        if Some(tag) != field.fid() {
            debug!(
                container = container.name(),
                field = field.name(),
                expected = format_args!("0x{:X}", field.fid().unwrap_or_default()),
                found = format_args!("0x{tag:X}"),
                "tag mismatch"
            );
            return Ok(absent());
        }
        cursor += field.fid_length();
    }

    let length = if field.variable() {
        if cursor + field.len_length() > limit {
            return truncated("length prefix", field.len_length());
        }
        let units = get_bits(data, cursor, field.len_length())?;
        cursor += field.len_length();
        let Some(bits) = usize::try_from(units)
            .ok()
            .and_then(|units| field.length_unit().to_bits(units))
        else {
            return Err(parse_error(
                container,
                field,
                format!("length prefix {units} overflows"),
            ));
        };
        Some(bits)
    } else {
        field
            .resolve_length(container)
            .or_else(|| field.hinted_length(data, cursor, limit))
    };

    let available = limit.saturating_sub(cursor);
    let bits = match length {
        None => parser.remainder_bits(cursor, limit.max(cursor)),
        Some(bits) if bits > available => {
            if options.strict {
                return Err(parse_error(
                    container,
                    field,
                    format!("value needs {bits} bits, {available} left"),
                ));
            }
            available
        }
        Some(bits) => bits,
    };

    Ok(Parsed {
        end: cursor + bits,
        value: Some(Located {
            range: cursor..cursor + bits,
            raw: extract(data, cursor, bits)?,
        }),
    })
}

/// Decodes a container from `data[offset..limit)` (bits).
///
/// Returns the container and the offset following its last field.
pub fn decode(
    schema: &'static Schema,
    data: &[u8],
    offset: usize,
    limit: Option<usize>,
    options: DecodeOptions,
) -> Result<(Container, usize)> {
    let available = data.len() * 8;
    let limit = limit.map_or(available, |limit| limit.min(available));
    let mut container = Container::empty(schema);
    let mut cursor = offset;

    for (idx, field) in schema.fields().iter().enumerate() {
        let parsed = field
            .parser()
            .strategy()
            .parse(field, &container, data, cursor, limit, options)?;
        cursor = parsed.end;
        let Some(Located { range, raw }) = parsed.value else {
            continue;
        };
        let value = match field.nested() {
            Some(Nested::Single(inner)) => {
                let (nested, _) = decode(*inner, data, range.start, Some(range.end), options)?;
                Value::from(nested)
            }
            Some(Nested::Sequence(candidates)) => {
                Value::Sequence(decode_sequence(field, candidates, data, range.clone(), options)?)
            }
            None => raw,
        };
        container.store_parsed(idx, value, range.len(), options.strict)?;
    }

    trace!(schema = schema.name(), offset, end = cursor, "decoded");
    Ok((container, cursor))
}

/// Decodes back-to-back elements filling `range`.
pub fn decode_sequence(
    field: &Field,
    candidates: &[&'static Schema],
    data: &[u8],
    range: Range<usize>,
    options: DecodeOptions,
) -> Result<Vec<Container>> {
    let sequence_error = |reason: String| Error::ParseError {
        container: "sequence".to_string(),
        field: field.name().to_string(),
        origin: field.origin(),
        reason,
    };
    let mut items = Vec::new();
    let mut cursor = range.start;
    while cursor < range.end {
        let Some(schema) = candidates
            .iter()
            .copied()
            .find(|schema| schema.accepts(data, cursor, range.end))
        else {
            if options.strict {
                return Err(sequence_error(format!("no element schema matches at bit {cursor}")));
            }
            debug!(field = field.name(), cursor, "unrecognised sequence element");
            break;
        };
        let (item, end) = decode(schema, data, cursor, Some(range.end), options)?;
        if end == cursor {
            return Err(sequence_error(format!("{} consumed no bits", schema.name())));
        }
        items.push(item);
        cursor = end;
    }
    Ok(items)
}

/// Value of a field as a left-aligned buffer and its bit length.
fn render(field: &Field, container: &Container, value: &Value) -> Result<(Vec<u8>, usize)> {
    let length = field.resolve_length(container);
    let (bytes, bits) = match value {
        Value::Container(inner) => encode_bits(inner)?,
        Value::Sequence(items) => {
            let mut writer = BitWriter::new();
            for item in items {
                encode_into(item, &mut writer)?;
            }
            let bits = writer.bit_len();
            (writer.into_bytes(), bits)
        }
        raw => match length {
            Some(bits) => return Ok((field.align_raw(raw, bits)?, bits)),
            None => match raw {
                Value::Bytes(bytes) => (bytes.clone(), bytes.len() * 8),
                other => {
                    let v = other.as_int().unwrap_or_default();
                    match field.length_unit() {
                        LengthUnit::Bytes => {
                            let bytes = minimal_bytes(v);
                            let bits = bytes.len() * 8;
                            (bytes, bits)
                        }
                        LengthUnit::Bits => {
                            let bits = bit_width(v).max(1);
                            let mut writer = BitWriter::new();
                            writer.push_int(bits, v)?;
                            (writer.into_bytes(), bits)
                        }
                    }
                }
            },
        },
    };
    match length {
        Some(declared) if bits > declared => Err(field.overflow(
            declared,
            format!("{:?} value encoded in {bits} bits", value.kind()),
        )),
        Some(declared) => {
            let mut writer = BitWriter::new();
            writer.push_slice(&bytes, 0, bits)?;
            writer.push_zeros(declared - bits);
            Ok((writer.into_bytes(), declared))
        }
        None => Ok((bytes, bits)),
    }
}

fn emit_field(
    field: &Field,
    container: &Container,
    value: &Value,
    writer: &mut BitWriter,
) -> Result<()> {
    let (payload, bits) = render(field, container, value)?;
    if field.has_tag() {
        let fid = field.fid().unwrap_or_default();
        writer
            .push_int(field.fid_length(), fid)
            .map_err(|_| field.overflow(field.fid_length(), format!("tag 0x{fid:X}")))?;
    }
    let mut padded = bits;
    if field.variable() {
        let unit = field.length_unit();
        let units = unit.from_bits(bits);
        padded = unit.to_bits(units).unwrap_or(bits);
        writer
            .push_int(field.len_length(), units as u64)
            .map_err(|_| field.overflow(field.len_length(), format!("length {units}")))?;
    }
    writer.push_slice(&payload, 0, bits)?;
    writer.push_zeros(padded - bits);
    Ok(())
}

fn encode_into(container: &Container, writer: &mut BitWriter) -> Result<()> {
    for (field, value) in container.iter() {
        match value {
            Some(value) => emit_field(field, container, value, writer)?,
            None if field.is_optional(container) => continue,
            None => return Err(container.missing(field)),
        }
    }
    Ok(())
}

/// Encodes a container, returning the bytes and the exact bit length.
pub fn encode_bits(container: &Container) -> Result<(Vec<u8>, usize)> {
    let mut writer = BitWriter::new();
    encode_into(container, &mut writer)?;
    let bits = writer.bit_len();
    Ok((writer.into_bytes(), bits))
}

/// Encodes a container. A trailing partial byte is zero-filled.
pub fn encode(container: &Container) -> Result<Vec<u8>> {
    let (bytes, bits) = encode_bits(container)?;
    trace!(
        schema = container.name(),
        bits,
        report_hex = format_args!("{:02X?}", bytes),
        "encoded"
    );
    Ok(bytes)
}

/// Bits a present field occupies: tag, length prefix and value.
pub fn field_bits(field: &Field, container: &Container, value: &Value) -> Result<usize> {
    let mut writer = BitWriter::new();
    emit_field(field, container, value, &mut writer)?;
    Ok(writer.bit_len())
}

/// Bits the value of a field occupies, without tag or length prefix.
pub fn value_bits(field: &Field, container: &Container, value: &Value) -> Result<usize> {
    render(field, container, value).map(|(_, bits)| bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Conversion;
    use crate::field::{Field, ParserKind};
    use crate::value::ValueKind;
    use lazy_static::lazy_static;

    /// Bits up to and including the first NUL byte.
    fn through_nul(data: &[u8], offset: usize, limit: usize) -> Option<usize> {
        if offset % 8 != 0 {
            return None;
        }
        let bytes = data.get(offset / 8..limit / 8)?;
        bytes.iter().position(|&b| b == 0).map(|at| (at + 1) * 8)
    }

    lazy_static! {
        static ref BLOB: Schema = Schema::builder("Blob")
            .field(
                Field::remainder("blob")
                    .tag(0x0F, 4)
                    .variable(4)
                    .unit(LengthUnit::Bytes)
            )
            .build()
            .unwrap();
        static ref TAGGED: Schema = Schema::builder("Tagged")
            .field(Field::bytes("head", 1))
            .field(Field::bytes("extra", 1).tag(0xA, 4).optional(true))
            .field(Field::bytes("tail", 1).tag(0xB, 4).optional(true))
            .build()
            .unwrap();
        static ref ITEM_A: Schema = Schema::builder("ItemA")
            .field(Field::bytes("a", 1).tag(0xA, 4))
            .build()
            .unwrap();
        static ref ITEM_B: Schema = Schema::builder("ItemB")
            .field(Field::bits("b", 4).tag(0xB, 4))
            .build()
            .unwrap();
        static ref LIST: Schema = Schema::builder("List")
            .field(Field::bytes("count", 1))
            .field(
                Field::remainder("items")
                    .parser(ParserKind::Bit)
                    .sequence(vec![&*ITEM_A, &*ITEM_B])
            )
            .build()
            .unwrap();
        static ref MANDATORY_TAG: Schema = Schema::builder("MandatoryTag")
            .field(Field::bytes("head", 1))
            .field(Field::bits("body", 8).tag(0xA, 4))
            .build()
            .unwrap();
        static ref COUNTED: Schema = Schema::builder("Counted")
            .field(Field::bytes("count", 1))
            .field(Field::computed("data", |c| {
                c.get_int("count").ok().map(|n| n as usize * 8)
            }))
            .field(Field::bytes("tail", 1))
            .build()
            .unwrap();
        static ref FLAGGED: Schema = Schema::builder("Flagged")
            .field(Field::bits("flags", 8))
            .field(
                Field::bytes("extra", 1)
                    .optional_when(|c| c.get_int("flags").map_or(true, |f| f & 1 == 0))
            )
            .build()
            .unwrap();
        static ref NAMED: Schema = Schema::builder("Named")
            .field(
                Field::remainder("name").conversion(
                    Conversion::plain(ValueKind::Bytes, |v| Ok(v)).length_hint(through_nul)
                )
            )
            .field(Field::bytes("rest", 1))
            .build()
            .unwrap();
        static ref BITS: Schema = Schema::builder("Bits")
            .field(Field::remainder("data").variable(4).parser(ParserKind::Bit))
            .field(Field::remainder("rest").parser(ParserKind::Bit))
            .build()
            .unwrap();
    }

    #[test]
    fn tagged_variable_field_layout() {
        let c = Container::new(&BLOB, [("blob", Value::Bytes(vec![0xDE, 0xAD]))]).unwrap();
        assert_eq!(encode(&c).unwrap(), vec![0xF2, 0xDE, 0xAD]);

        let (decoded, end) =
            decode(&BLOB, &[0xF2, 0xDE, 0xAD], 0, None, DecodeOptions::default()).unwrap();
        assert_eq!(end, 24);
        assert_eq!(decoded, c);
    }

    #[test]
    fn optional_tag_mismatch_is_absent() {
        let (c, end) =
            decode(&TAGGED, &[0x01, 0xB7, 0x70], 0, None, DecodeOptions::default()).unwrap();
        assert_eq!(c.get("extra").unwrap(), None);
        assert_eq!(c.get("tail").unwrap(), Some(&Value::Bytes(vec![0x77])));
        assert_eq!(end, 20);
    }

    #[test]
    fn mandatory_tag_mismatch_is_absent() {
        for options in [DecodeOptions::default(), DecodeOptions::lenient()] {
            let (c, end) = decode(&MANDATORY_TAG, &[0x01, 0xB0, 0x00], 0, None, options).unwrap();
            assert_eq!(end, 8);
            assert_eq!(c.get("head").unwrap(), Some(&Value::Bytes(vec![0x01])));
            assert_eq!(c.get("body").unwrap(), None);
            assert!(matches!(
                encode(&c),
                Err(Error::MissingField { ref field, .. }) if field == "body"
            ));
        }
        assert!(Container::new(&MANDATORY_TAG, [("head", Value::Int(1))]).is_err());
    }

    #[test]
    fn mandatory_field_past_end() {
        let err = decode(&TAGGED, &[], 0, None, DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));

        let (c, _) = decode(&TAGGED, &[], 0, None, DecodeOptions::lenient()).unwrap();
        assert_eq!(c.get("head").unwrap(), Some(&Value::Bytes(vec![])));
        assert_eq!(c.get("extra").unwrap(), None);
    }

    #[test]
    fn truncated_value_strict_and_lenient() {
        lazy_static! {
            static ref WIDE: Schema = Schema::builder("Wide")
                .field(Field::bytes("word", 2))
                .build()
                .unwrap();
        }
        let err = decode(&WIDE, &[0x12], 0, None, DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));

        let (c, end) = decode(&WIDE, &[0x12], 0, None, DecodeOptions::lenient()).unwrap();
        assert_eq!(end, 8);
        assert_eq!(c.get("word").unwrap(), Some(&Value::Bytes(vec![0x12])));
    }

    #[test]
    fn sequence_elements_follow_tags() {
        let data = [0x02, 0xA1, 0x2B, 0x50];
        let (c, end) = decode(&LIST, &data, 0, Some(28), DecodeOptions::default()).unwrap();
        assert_eq!(end, 28);
        let items = c.get("items").unwrap().and_then(Value::as_sequence).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name(), "ItemA");
        assert_eq!(items[0].get_int("a").unwrap(), 0x12);
        assert_eq!(items[1].name(), "ItemB");
        assert_eq!(items[1].get_int("b").unwrap(), 0x5);

        let (bytes, bits) = encode_bits(&c).unwrap();
        assert_eq!(bits, 28);
        assert_eq!(bytes, data.to_vec());
    }

    #[test]
    fn unknown_sequence_element() {
        let data = [0x01, 0xC0];
        assert!(decode(&LIST, &data, 0, None, DecodeOptions::default()).is_err());
        let (c, _) = decode(&LIST, &data, 0, None, DecodeOptions::lenient()).unwrap();
        assert_eq!(c.get("items").unwrap(), Some(&Value::Sequence(vec![])));
    }

    #[test]
    fn bit_parser_counts_bits() {
        let c = Container::new(
            &BITS,
            [("data", Value::Int(0x5)), ("rest", Value::Int(0x1))],
        )
        .unwrap();
        // prefix 3, value 101, rest 1
        let (bytes, bits) = encode_bits(&c).unwrap();
        assert_eq!(bits, 8);
        assert_eq!(bytes, vec![0x3B]);

        let (decoded, end) =
            decode(&BITS, &bytes, 0, Some(bits), DecodeOptions::default()).unwrap();
        assert_eq!(end, 8);
        assert_eq!(decoded, c);
    }

    #[test]
    fn length_prefix_overflow() {
        let c = Container::new(&BLOB, [("blob", Value::Bytes(vec![0; 16]))]).unwrap();
        assert!(matches!(encode(&c), Err(Error::ValueOverflow { bits: 4, .. })));
    }

    #[test]
    fn extract_picks_representation() {
        assert_eq!(extract(&[0xAB, 0xCD], 4, 8).unwrap(), Value::Bytes(vec![0xBC]));
        assert_eq!(extract(&[0xAB, 0xCD], 4, 4).unwrap(), Value::Int(0xB));
        assert_eq!(extract(&[0xAB], 8, 0).unwrap(), Value::Bytes(vec![]));
        assert_eq!(extract(&[], 0, 0).unwrap(), Value::Bytes(vec![]));
    }

    #[test]
    fn oversized_length_prefix_is_a_parse_error() {
        lazy_static! {
            static ref HUGE: Schema = Schema::builder("Huge")
                .field(Field::remainder("blob").variable(64).unit(LengthUnit::Bytes))
                .build()
                .unwrap();
        }
        for options in [DecodeOptions::default(), DecodeOptions::lenient()] {
            assert!(matches!(
                decode(&HUGE, &[0xFF; 9], 0, None, options),
                Err(Error::ParseError { ref field, .. }) if field == "blob"
            ));
        }
        assert_eq!(LengthUnit::Bytes.to_bits(usize::MAX), None);
        assert_eq!(LengthUnit::Bits.to_bits(usize::MAX), Some(usize::MAX));
    }

    #[test]
    fn computed_length_follows_sibling() {
        let c = Container::new(
            &COUNTED,
            [
                ("count", Value::Int(2)),
                ("data", Value::Bytes(vec![0xAA, 0xBB])),
                ("tail", Value::Int(0x77)),
            ],
        )
        .unwrap();
        assert_eq!(encode(&c).unwrap(), vec![0x02, 0xAA, 0xBB, 0x77]);

        let (decoded, end) =
            decode(&COUNTED, &[0x02, 0xAA, 0xBB, 0x77], 0, None, DecodeOptions::default())
                .unwrap();
        assert_eq!(end, 32);
        assert_eq!(decoded, c);

        let (short, end) =
            decode(&COUNTED, &[0x01, 0xAA, 0x77], 0, None, DecodeOptions::default()).unwrap();
        assert_eq!(end, 24);
        assert_eq!(short.get("data").unwrap(), Some(&Value::Bytes(vec![0xAA])));
        assert_eq!(short.get("tail").unwrap(), Some(&Value::Bytes(vec![0x77])));
    }

    #[test]
    fn optionality_follows_flags() {
        let plain = Container::new(&FLAGGED, [("flags", Value::Int(0))]).unwrap();
        assert_eq!(encode(&plain).unwrap(), vec![0x00]);
        assert!(matches!(
            Container::new(&FLAGGED, [("flags", Value::Int(1))]),
            Err(Error::MissingField { ref field, .. }) if field == "extra"
        ));
        let flagged =
            Container::new(&FLAGGED, [("flags", Value::Int(1)), ("extra", Value::Int(0x42))])
                .unwrap();
        assert_eq!(encode(&flagged).unwrap(), vec![0x01, 0x42]);

        let (c, end) = decode(&FLAGGED, &[0x00], 0, None, DecodeOptions::default()).unwrap();
        assert_eq!(end, 8);
        assert_eq!(c.get("extra").unwrap(), None);
        assert!(matches!(
            decode(&FLAGGED, &[0x01], 0, None, DecodeOptions::default()),
            Err(Error::MissingField { ref field, .. }) if field == "extra"
        ));
        let (c, _) = decode(&FLAGGED, &[0x01, 0x42], 0, None, DecodeOptions::default()).unwrap();
        assert_eq!(c, flagged);
    }

    #[test]
    fn length_hint_sizes_undeclared_field() {
        let data = [0x41, 0x42, 0x00, 0x07];
        let (c, end) = decode(&NAMED, &data, 0, None, DecodeOptions::default()).unwrap();
        assert_eq!(end, 32);
        assert_eq!(c.get("name").unwrap(), Some(&Value::Bytes(vec![0x41, 0x42, 0x00])));
        assert_eq!(c.get("rest").unwrap(), Some(&Value::Bytes(vec![0x07])));
        assert_eq!(encode(&c).unwrap(), data.to_vec());
    }
}
