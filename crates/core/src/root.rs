//! Root feature (0x0000), version 2.
//!
//! Function 0: getFeature(featureId) → feature index, type bitmap, version
//! Function 1: getProtocolVersion(pingData) → protocol number, target software, ping echo
//!
//! The root feature always sits at feature index 0.

use lazy_static::lazy_static;

use crate::check::Check;
use crate::feature::FeatureModel;
use crate::field::Field;
use crate::hidpp::{features, MessageBuilder};
use crate::schema::{declare, Schema};

pub const VERSION: u8 = 2;

/// Feature index of the root feature on every device.
pub const FEATURE_INDEX: u8 = 0x00;
/// `feat_index` returned for features the device does not have.
pub const FEATURE_NOT_FOUND: u8 = 0x00;

pub const GET_FEATURE: u8 = 0;
pub const GET_PROTOCOL_VERSION: u8 = 1;

lazy_static! {
    /// Type flags of a feature.
    pub static ref FEATURE_TYPE: Schema = declare(
        Schema::builder("FeatureType")
            .field(
                Field::bits("obsolete", 1)
                    .alias("obsl")
                    .title("Obsolete")
                    .check(Check::width(1))
                    .default(0u8),
            )
            .field(
                Field::bits("hidden", 1)
                    .title("Hidden")
                    .check(Check::width(1))
                    .default(0u8),
            )
            .field(
                Field::bits("engineering", 1)
                    .alias("eng")
                    .title("Engineering")
                    .check(Check::width(1))
                    .default(0u8),
            )
            .field(
                Field::bits("manufacturing_deactivatable", 1)
                    .alias("manuf_deact")
                    .title("Manufacturing Deactivatable")
                    .check(Check::width(1))
                    .default(0u8),
            )
            .field(
                Field::bits("compliance_deactivatable", 1)
                    .alias("compl_deact")
                    .title("Compliance Deactivatable")
                    .check(Check::width(1))
                    .default(0u8),
            )
            .field(
                Field::bits("reserved", 3)
                    .title("Reserved")
                    .check(Check::width(3))
                    .default(0u8),
            )
            .build()
    );

    pub static ref GET_FEATURE_REQUEST: Schema = declare(
        MessageBuilder::request("GetFeature", features::ROOT, GET_FEATURE)
            .field(
                Field::bytes("feature_id", 2)
                    .title("Feature ID")
                    .check(Check::FixedByteLength(2))
                    .check(Check::width(16)),
            )
            .build()
    );

    pub static ref GET_FEATURE_RESPONSE: Schema = declare(
        MessageBuilder::response("GetFeatureResponse", features::ROOT, GET_FEATURE)
            .version(VERSION)
            .field(
                Field::bytes("feat_index", 1)
                    .title("Feature Index")
                    .check(Check::byte())
                    .interpret(&[(u64::from(FEATURE_NOT_FOUND), "not found")])
                    .zero_print(),
            )
            .field(
                Field::bits("feature_type", 8)
                    .title("Feature Type")
                    .nested(&FEATURE_TYPE),
            )
            .field(
                Field::bytes("feature_version", 1)
                    .alias("feat_ver")
                    .title("Feature Version")
                    .check(Check::byte()),
            )
            .build()
    );

    pub static ref GET_PROTOCOL_VERSION_REQUEST: Schema = declare(
        MessageBuilder::request("GetProtocolVersion", features::ROOT, GET_PROTOCOL_VERSION)
            .field(
                Field::bytes("zero", 2)
                    .title("Zero")
                    .check(Check::OneOf(vec![0]))
                    .default(0u8),
            )
            .field(
                Field::bytes("ping_data", 1)
                    .title("Ping Data")
                    .check(Check::byte()),
            )
            .build()
    );

    pub static ref GET_PROTOCOL_VERSION_RESPONSE: Schema = declare(
        MessageBuilder::response(
            "GetProtocolVersionResponse",
            features::ROOT,
            GET_PROTOCOL_VERSION,
        )
        .field(
            Field::bytes("protocol_number", 1)
                .title("Protocol Number")
                .check(Check::byte()),
        )
        .field(
            Field::bytes("target_software", 1)
                .title("Target Software")
                .check(Check::byte()),
        )
        .field(
            Field::bytes("ping_data", 1)
                .title("Ping Data")
                .check(Check::byte())
                .zero_print(),
        )
        .build()
    );

    pub static ref MODEL: FeatureModel = FeatureModel::new("Root", features::ROOT, VERSION)
        .function(GET_FEATURE, &GET_FEATURE_REQUEST, &GET_FEATURE_RESPONSE)
        .function(
            GET_PROTOCOL_VERSION,
            &GET_PROTOCOL_VERSION_REQUEST,
            &GET_PROTOCOL_VERSION_RESPONSE,
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeOptions;
    use crate::container::Container;
    use crate::hidpp::{decode_message, encode_message, LONG_REPORT_LEN};
    use crate::value::Value;

    #[test]
    fn get_feature_request_layout() {
        let request = Container::new(
            &GET_FEATURE_REQUEST,
            [
                ("device_index", Value::from(0x01u8)),
                ("feature_index", Value::from(FEATURE_INDEX)),
                ("feature_id", Value::from(features::HIRES_WHEEL)),
            ],
        )
        .unwrap();
        assert_eq!(
            encode_message(&request).unwrap(),
            vec![0x10, 0x01, 0x00, 0x00, 0x21, 0x21, 0x00]
        );
    }

    #[test]
    fn get_feature_response_type_bits() {
        let mut frame = vec![0x11, 0x01, 0x00, 0x00, 0x0C, 0b1010_0000, 0x00];
        frame.resize(LONG_REPORT_LEN, 0);
        let response =
            decode_message(&GET_FEATURE_RESPONSE, &frame, DecodeOptions::default()).unwrap();
        assert_eq!(response.get_int("feat_index").unwrap(), 0x0C);
        let kind = response.get_container("feature_type").unwrap();
        assert_eq!(kind.get_int("obsl").unwrap(), 1);
        assert_eq!(kind.get_int("hidden").unwrap(), 0);
        assert_eq!(kind.get_int("engineering").unwrap(), 1);
        assert_eq!(response.get_int("feat_ver").unwrap(), 0);
    }

    #[test]
    fn protocol_version_ping() {
        let request = Container::new(
            &GET_PROTOCOL_VERSION_REQUEST,
            [
                ("device_index", Value::from(0xFFu8)),
                ("feature_index", Value::from(FEATURE_INDEX)),
                ("ping_data", Value::from(0x5Au8)),
            ],
        )
        .unwrap();
        assert_eq!(
            encode_message(&request).unwrap(),
            vec![0x10, 0xFF, 0x00, 0x10, 0x00, 0x00, 0x5A]
        );

        let mut frame = vec![0x11, 0xFF, 0x00, 0x10, 0x04, 0x02, 0x5A];
        frame.resize(LONG_REPORT_LEN, 0);
        let response = MODEL.match_response(&request, &frame).unwrap().unwrap();
        assert_eq!(response.get_int("protocol_number").unwrap(), 4);
        assert_eq!(response.get_int("ping_data").unwrap(), 0x5A);
    }

    #[test]
    fn ping_data_is_mandatory() {
        let err = Container::new(
            &GET_PROTOCOL_VERSION_REQUEST,
            [
                ("device_index", Value::from(0x01u8)),
                ("feature_index", Value::from(FEATURE_INDEX)),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::Error::MissingField { field, .. } if field == "ping_data"));
    }
}
