//! hidpp-codec-core: declarative bit-level codec for HID++ 2.0 messages.
//!
//! Messages are described as ordered field schemas. A [`Container`] holds
//! the values of one message and converts to and from the exact wire bytes,
//! with checks, conversions and defaults applied along the way.

pub mod bits;
pub mod check;
pub mod codec;
pub mod container;
pub mod convert;
pub mod deactivatable_features;
pub mod error;
pub mod feature;
pub mod field;
pub mod hidpp;
pub mod hires_wheel;
pub mod root;
pub mod schema;
pub mod value;

/// Strict or lenient decoding.
pub use codec::DecodeOptions;
/// Values of one message, typed by its schema.
pub use container::Container;
/// Codec errors and the crate-wide result alias.
pub use error::{Error, Result};
/// Registry of the HID++ features with message layouts.
pub use feature::{find_model, find_schema, models, FeatureModel};
/// Field descriptors and their length and parser settings.
pub use field::{Field, LengthUnit, ParserKind};
/// HID++ report framing.
pub use hidpp::{decode_message, encode_message, MessageBuilder};
/// Ordered field layout of a message.
pub use schema::Schema;
/// Dynamically typed field value.
pub use value::Value;
