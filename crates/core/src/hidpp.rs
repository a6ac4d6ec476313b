//! HID++ 2.0 message framing.
//!
//! HID++ uses two report formats:
//! - Short reports: 7 bytes (report ID 0x10)
//! - Long reports: 20 bytes (report ID 0x11)
//!
//! Every message starts with the same 4-byte header: report ID, device
//! index, feature index, then the function index and software ID sharing
//! one byte. Message schemas built here carry that header and pad their
//! payload to the report size.
//!
//! Protocol reference: libratbag (MIT) and Solaar (GPLv2, protocol knowledge only).

use std::fmt;

use tracing::trace;

use crate::check::Check;
use crate::codec::{self, DecodeOptions};
use crate::container::Container;
use crate::error::{Error, Origin, Result};
use crate::field::{Field, FieldBuilder};
use crate::schema::Schema;

/// HID++ report ID for short messages (7 bytes total).
pub const SHORT_REPORT_ID: u8 = 0x10;
/// HID++ report ID for long messages (20 bytes total).
pub const LONG_REPORT_ID: u8 = 0x11;

/// Short report length (including report ID).
pub const SHORT_REPORT_LEN: usize = 7;
/// Long report length (including report ID).
pub const LONG_REPORT_LEN: usize = 20;

/// Header length shared by both report formats.
pub const HEADER_LEN: usize = 4;

/// Feature index of HID++ 2.0 error reports.
pub const ERROR_FEATURE_INDEX: u8 = 0xFF;

/// Software ID written when the caller does not pick one.
pub const DEFAULT_SOFTWARE_ID: u8 = 0x0;

/// HID++ 2.0 feature IDs with message layouts in this crate.
pub mod features {
    /// Root feature: device ping and feature index lookup.
    pub const ROOT: u16 = 0x0000;
    /// Authenticated enable/disable of deactivatable features.
    pub const MANAGE_DEACTIVATABLE_FEATURES_AUTH: u16 = 0x1E02;
    /// High resolution scroll wheel.
    pub const HIRES_WHEEL: u16 = 0x2121;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Short,
    Long,
}

impl ReportKind {
    pub fn report_id(self) -> u8 {
        match self {
            ReportKind::Short => SHORT_REPORT_ID,
            ReportKind::Long => LONG_REPORT_ID,
        }
    }

    /// Frame length in bytes, report ID included.
    pub fn len(self) -> usize {
        match self {
            ReportKind::Short => SHORT_REPORT_LEN,
            ReportKind::Long => LONG_REPORT_LEN,
        }
    }

    /// Bits following the header.
    pub fn payload_bits(self) -> usize {
        (self.len() - HEADER_LEN) * 8
    }

    pub fn from_report_id(report_id: u8) -> Option<Self> {
        match report_id {
            SHORT_REPORT_ID => Some(ReportKind::Short),
            LONG_REPORT_ID => Some(ReportKind::Long),
            _ => None,
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Short => write!(f, "short report (0x{SHORT_REPORT_ID:02X}, {SHORT_REPORT_LEN} bytes)"),
            ReportKind::Long => write!(f, "long report (0x{LONG_REPORT_ID:02X}, {LONG_REPORT_LEN} bytes)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
    Event,
}

/// Framing of a message schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub feature_id: u16,
    pub report: ReportKind,
    pub kind: MessageKind,
    /// Function index for requests and responses, event index for events.
    pub function_index: u8,
}

/// Builds the schema of one HID++ message: header, payload, then padding
/// up to the report size.
pub struct MessageBuilder {
    name: &'static str,
    envelope: Envelope,
    versions: Vec<u8>,
    payload: Vec<FieldBuilder>,
}

impl MessageBuilder {
    fn new(
        name: &'static str,
        feature_id: u16,
        function_index: u8,
        kind: MessageKind,
        report: ReportKind,
    ) -> Self {
        Self {
            name,
            envelope: Envelope {
                feature_id,
                report,
                kind,
                function_index,
            },
            versions: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Request, sent as a short report unless told otherwise.
    pub fn request(name: &'static str, feature_id: u16, function_index: u8) -> Self {
        Self::new(name, feature_id, function_index, MessageKind::Request, ReportKind::Short)
    }

    /// Response, sent as a long report.
    pub fn response(name: &'static str, feature_id: u16, function_index: u8) -> Self {
        Self::new(name, feature_id, function_index, MessageKind::Response, ReportKind::Long)
    }

    /// Event, sent as a long report.
    pub fn event(name: &'static str, feature_id: u16, event_index: u8) -> Self {
        Self::new(name, feature_id, event_index, MessageKind::Event, ReportKind::Long)
    }

    pub fn short(mut self) -> Self {
        self.envelope.report = ReportKind::Short;
        self
    }

    pub fn long(mut self) -> Self {
        self.envelope.report = ReportKind::Long;
        self
    }

    pub fn version(mut self, version: u8) -> Self {
        self.versions.push(version);
        self
    }

    pub fn field(mut self, field: FieldBuilder) -> Self {
        self.payload.push(field);
        self
    }

    /// Header fields are attributed to the caller, as is the padding.
    #[track_caller]
    pub fn build(self) -> Result<Schema> {
        let report = self.envelope.report;
        let payload_bits = report.payload_bits();
        let sizes: Option<Vec<usize>> = self.payload.iter().map(FieldBuilder::wire_bits).collect();
        let used = sizes.as_ref().map(|sizes| sizes.iter().sum::<usize>());
        if let Some(used) = used.filter(|used| *used > payload_bits) {
            return Err(Error::InvalidSchema {
                name: self.name.to_string(),
                origin: Origin::caller(),
                reason: format!("{used}-bit payload does not fit in a {report}"),
            });
        }

        let report_id = report.report_id();
        let mut builder = Schema::builder(self.name)
            .envelope(self.envelope)
            .field(
                Field::bytes("report_id", 1)
                    .title("Report ID")
                    .check(Check::OneOf(vec![u64::from(report_id)]))
                    .default(report_id),
            )
            .field(
                Field::bytes("device_index", 1)
                    .title("Device Index")
                    .check(Check::byte()),
            )
            .field(
                Field::bytes("feature_index", 1)
                    .title("Feature Index")
                    .check(Check::byte()),
            )
            .field(
                Field::bits("function_index", 4)
                    .title("Function Index")
                    .check(Check::width(4))
                    .default(self.envelope.function_index),
            )
            .field(
                Field::bits("software_id", 4)
                    .title("Software ID")
                    .check(Check::width(4))
                    .default(DEFAULT_SOFTWARE_ID),
            )
            .fields(self.payload);
        if let Some(used) = used.filter(|used| *used < payload_bits) {
            builder = builder.field(
                Field::bits("padding", payload_bits - used)
                    .title("Padding")
                    .padding(),
            );
        }
        for version in self.versions {
            builder = builder.version(version);
        }
        builder.build()
    }
}

/// The 4-byte header of any HID++ frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub report_id: u8,
    pub device_index: u8,
    pub feature_index: u8,
    pub function_index: u8,
    pub software_id: u8,
}

impl Header {
    /// Reads the header of a raw frame.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        match frame {
            [report_id, device_index, feature_index, function_sw, ..] => Ok(Self {
                report_id: *report_id,
                device_index: *device_index,
                feature_index: *feature_index,
                function_index: function_sw >> 4,
                software_id: function_sw & 0x0F,
            }),
            _ => Err(Error::InvalidFraming {
                message: "HID++ frame".into(),
                expected: format!("at least {HEADER_LEN} bytes"),
                found: describe(frame),
            }),
        }
    }

    /// Reads the header fields of a message container.
    pub fn of(container: &Container) -> Result<Self> {
        let byte = |name: &str| container.get_int(name).map(|v| v as u8);
        Ok(Self {
            report_id: byte("report_id")?,
            device_index: byte("device_index")?,
            feature_index: byte("feature_index")?,
            function_index: byte("function_index")?,
            software_id: byte("software_id")?,
        })
    }

    /// HID++ 2.0 errors have feature_index == 0xFF.
    pub fn is_error(&self) -> bool {
        self.feature_index == ERROR_FEATURE_INDEX
    }
}

fn describe(frame: &[u8]) -> String {
    match frame.first() {
        Some(report_id) => format!("{} bytes with report ID 0x{report_id:02X}", frame.len()),
        None => "an empty frame".into(),
    }
}

fn envelope_of(schema: &Schema) -> Result<&Envelope> {
    schema.envelope().ok_or_else(|| Error::InvalidFraming {
        message: schema.name().into(),
        expected: "a HID++ message schema".into(),
        found: "a schema without framing".into(),
    })
}

/// Encodes a message into a full-size report.
pub fn encode_message(container: &Container) -> Result<Vec<u8>> {
    let envelope = envelope_of(container.schema())?;
    let expected = envelope.report.len();
    let mut frame = codec::encode(container)?;
    if frame.len() > expected {
        return Err(Error::InvalidFraming {
            message: container.name().into(),
            expected: envelope.report.to_string(),
            found: format!("a {}-byte encoding", frame.len()),
        });
    }
    frame.resize(expected, 0);
    trace!(
        message = container.name(),
        report_hex = format_args!("{:02X?}", frame),
        "HID++ TX"
    );
    Ok(frame)
}

/// Decodes a full report. The report ID and frame length must match the
/// message's report kind, in lenient mode too.
pub fn decode_message(
    schema: &'static Schema,
    frame: &[u8],
    options: DecodeOptions,
) -> Result<Container> {
    let envelope = envelope_of(schema)?;
    let report = envelope.report;
    if frame.first() != Some(&report.report_id()) || frame.len() != report.len() {
        return Err(Error::InvalidFraming {
            message: schema.name().into(),
            expected: report.to_string(),
            found: describe(frame),
        });
    }
    trace!(
        message = schema.name(),
        report_hex = format_args!("{:02X?}", frame),
        "HID++ RX"
    );
    Container::from_bytes(schema, frame, options)
}
