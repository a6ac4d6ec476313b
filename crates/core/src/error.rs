//! Error types for hidpp-codec-core.

use std::fmt;
use std::panic::Location;

use thiserror::Error;

/// Source location where a field descriptor was declared.
///
/// Captured once when the descriptor is built and attached to every error the
/// descriptor raises afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin(Option<&'static Location<'static>>);

impl Origin {
    /// An origin for values that were not declared by a descriptor.
    pub const UNKNOWN: Self = Self(None);

    /// Records the location of the caller.
    #[track_caller]
    pub fn caller() -> Self {
        Self(Some(Location::caller()))
    }

    /// File and line of the declaration, if known.
    pub fn location(&self) -> Option<(&'static str, u32)> {
        self.0.map(|loc| (loc.file(), loc.line()))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(loc) => write!(f, "declared at {}:{}", loc.file(), loc.line()),
            None => f.write_str("undeclared"),
        }
    }
}

/// Codec error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A bit window falls outside of the buffer.
    #[error("bit window [{offset}, {offset}+{count}) is outside of a {available}-bit buffer")]
    OutOfRange {
        offset: usize,
        count: usize,
        available: usize,
    },

    /// A value failed the checks or conversions of its field.
    #[error("invalid value for {field} ({origin}): {reason}")]
    InvalidValue {
        field: String,
        origin: Origin,
        reason: String,
    },

    /// An attribute name is neither a canonical field name nor an alias.
    #[error("{container} has no field named {name:?}{}", suggestion_suffix(.suggestion))]
    UnknownField {
        container: String,
        name: String,
        suggestion: Option<String>,
    },

    /// A value does not fit in the bit width of its field, tag or length prefix.
    #[error("{detail} does not fit in {bits} bits for {field} ({origin})")]
    ValueOverflow {
        field: String,
        origin: Origin,
        bits: usize,
        detail: String,
    },

    /// A mandatory field is absent.
    #[error("mandatory field {container}.{field} is missing ({origin})")]
    MissingField {
        container: String,
        field: String,
        origin: Origin,
    },

    /// The byte stream is malformed.
    #[error("cannot parse {container}.{field} ({origin}): {reason}")]
    ParseError {
        container: String,
        field: String,
        origin: Origin,
        reason: String,
    },

    /// A frame does not match the report size declared by its message.
    #[error("{message} expects a {expected} frame, got {found}")]
    InvalidFraming {
        message: String,
        expected: String,
        found: String,
    },

    /// The device answered a request with a HID++ 2.0 error report.
    #[error("HID++ error 0x{code:02X} for feature index 0x{feature_index:02X}, function {function_index}")]
    DeviceError {
        feature_index: u8,
        function_index: u8,
        code: u8,
    },

    /// A field or schema declaration breaks the descriptor contract.
    #[error("invalid declaration of {name} ({origin}): {reason}")]
    InvalidSchema {
        name: String,
        origin: Origin,
        reason: String,
    },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean {name:?}?)"),
        None => String::new(),
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_points_at_caller() {
        let origin = Origin::caller();
        let (file, line) = origin.location().unwrap();
        assert!(file.ends_with("error.rs"));
        assert!(line > 0);
        assert!(origin.to_string().starts_with("declared at "));
    }

    #[test]
    fn unknown_origin_renders() {
        assert_eq!(Origin::UNKNOWN.to_string(), "undeclared");
        assert!(Origin::UNKNOWN.location().is_none());
    }

    #[test]
    fn unknown_field_mentions_suggestion() {
        let err = Error::UnknownField {
            container: "BitMap".into(),
            name: "Gothard".into(),
            suggestion: Some("gothard".into()),
        };
        let text = err.to_string();
        assert!(text.contains("BitMap has no field named \"Gothard\""));
        assert!(text.contains("did you mean \"gothard\"?"));
    }

    #[test]
    fn overflow_message_names_width() {
        let err = Error::ValueOverflow {
            field: "reserved".into(),
            origin: Origin::UNKNOWN,
            bits: 4,
            detail: "0x10".into(),
        };
        assert_eq!(
            err.to_string(),
            "0x10 does not fit in 4 bits for reserved (undeclared)"
        );
    }
}
