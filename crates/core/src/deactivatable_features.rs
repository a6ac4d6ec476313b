//! Manage deactivatable features, authenticated (0x1E02), version 0.
//!
//! Function 0: getInfo() → support, persist and state bit maps
//! Function 1: disableFeatures(bitMap)
//! Function 2: enableFeatures(bitMap)
//! Function 3: getReactInfo() → feature ID to authenticate against
//!
//! Enable and disable requests carry their bit map in a long report.

use lazy_static::lazy_static;

use crate::check::Check;
use crate::feature::FeatureModel;
use crate::field::{Field, FieldBuilder};
use crate::hidpp::{features, MessageBuilder};
use crate::schema::{declare, Schema};

pub const VERSION: u8 = 0;

pub const GET_INFO: u8 = 0;
pub const DISABLE_FEATURES: u8 = 1;
pub const ENABLE_FEATURES: u8 = 2;
pub const GET_REACT_INFO: u8 = 3;

fn flag(name: &'static str, title: &'static str) -> FieldBuilder {
    Field::bits(name, 1)
        .title(title)
        .check(Check::width(1))
        .default(0u8)
}

fn bit_map(name: &'static str, title: &'static str) -> FieldBuilder {
    Field::bits(name, 8)
        .title(title)
        .nested(&BIT_MAP)
        .zero_print()
}

lazy_static! {
    /// One bit per deactivatable group of HID++ features.
    pub static ref BIT_MAP: Schema = declare(
        Schema::builder("BitMap")
            .field(flag("all_bit", "All Bit").optional(true))
            .field(
                Field::bits("reserved", 4)
                    .title("Reserved")
                    .check(Check::width(4))
                    .default(0u8),
            )
            .field(flag("gothard", "Gothard").alias("gotthard"))
            .field(flag("compliance", "Compliance").alias("compl_hidpp"))
            .field(flag("manufacturing", "Manufacturing").alias("manuf_hidpp"))
            .build()
    );

    pub static ref GET_INFO_REQUEST: Schema = declare(
        MessageBuilder::request(
            "GetInfo",
            features::MANAGE_DEACTIVATABLE_FEATURES_AUTH,
            GET_INFO,
        )
        .build()
    );

    pub static ref GET_INFO_RESPONSE: Schema = declare(
        MessageBuilder::response(
            "GetInfoResponse",
            features::MANAGE_DEACTIVATABLE_FEATURES_AUTH,
            GET_INFO,
        )
        .field(bit_map("support_bit_map", "Support Bit Map"))
        .field(bit_map("persist_bit_map", "Persist Bit Map"))
        .field(bit_map("state_bit_map", "State Bit Map"))
        .build()
    );

    pub static ref DISABLE_FEATURES_REQUEST: Schema = declare(
        MessageBuilder::request(
            "DisableFeatures",
            features::MANAGE_DEACTIVATABLE_FEATURES_AUTH,
            DISABLE_FEATURES,
        )
        .long()
        .field(bit_map("disable_bit_map", "Disable Bit Map"))
        .build()
    );

    pub static ref DISABLE_FEATURES_RESPONSE: Schema = declare(
        MessageBuilder::response(
            "DisableFeaturesResponse",
            features::MANAGE_DEACTIVATABLE_FEATURES_AUTH,
            DISABLE_FEATURES,
        )
        .build()
    );

    pub static ref ENABLE_FEATURES_REQUEST: Schema = declare(
        MessageBuilder::request(
            "EnableFeatures",
            features::MANAGE_DEACTIVATABLE_FEATURES_AUTH,
            ENABLE_FEATURES,
        )
        .long()
        .field(bit_map("enable_bit_map", "Enable Bit Map"))
        .build()
    );

    pub static ref ENABLE_FEATURES_RESPONSE: Schema = declare(
        MessageBuilder::response(
            "EnableFeaturesResponse",
            features::MANAGE_DEACTIVATABLE_FEATURES_AUTH,
            ENABLE_FEATURES,
        )
        .build()
    );

    pub static ref GET_REACT_INFO_REQUEST: Schema = declare(
        MessageBuilder::request(
            "GetReactInfo",
            features::MANAGE_DEACTIVATABLE_FEATURES_AUTH,
            GET_REACT_INFO,
        )
        .build()
    );

    pub static ref GET_REACT_INFO_RESPONSE: Schema = declare(
        MessageBuilder::response(
            "GetReactInfoResponse",
            features::MANAGE_DEACTIVATABLE_FEATURES_AUTH,
            GET_REACT_INFO,
        )
        .field(
            Field::bytes("auth_feature", 2)
                .title("Auth Feature")
                .check(Check::width(16)),
        )
        .build()
    );

    pub static ref MODEL: FeatureModel = FeatureModel::new(
        "ManageDeactivatableFeaturesAuth",
        features::MANAGE_DEACTIVATABLE_FEATURES_AUTH,
        VERSION,
    )
    .function(GET_INFO, &GET_INFO_REQUEST, &GET_INFO_RESPONSE)
    .function(DISABLE_FEATURES, &DISABLE_FEATURES_REQUEST, &DISABLE_FEATURES_RESPONSE)
    .function(ENABLE_FEATURES, &ENABLE_FEATURES_REQUEST, &ENABLE_FEATURES_RESPONSE)
    .function(GET_REACT_INFO, &GET_REACT_INFO_REQUEST, &GET_REACT_INFO_RESPONSE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, DecodeOptions};
    use crate::container::Container;
    use crate::error::Error;
    use crate::hidpp::{decode_message, encode_message, LONG_REPORT_LEN, SHORT_REPORT_LEN};
    use crate::value::Value;

    fn flags(gothard: u8, compliance: u8, manufacturing: u8) -> Container {
        Container::new(
            &BIT_MAP,
            [
                ("gothard", Value::from(gothard)),
                ("compliance", Value::from(compliance)),
                ("manufacturing", Value::from(manufacturing)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn bit_map_encodes_flags() {
        assert_eq!(codec::encode(&flags(1, 0, 1)).unwrap(), vec![0x05]);
        assert_eq!(codec::encode(&flags(1, 1, 1)).unwrap(), vec![0x07]);
    }

    #[test]
    fn bit_map_decodes_all_bit() {
        let decoded = Container::from_bytes(&BIT_MAP, &[0x83], DecodeOptions::default()).unwrap();
        assert_eq!(decoded.get_int("all_bit").unwrap(), 1);
        assert_eq!(decoded.get_int("gothard").unwrap(), 0);
        assert_eq!(decoded.get_int("compl_hidpp").unwrap(), 1);
        assert_eq!(decoded.get_int("manuf_hidpp").unwrap(), 1);
    }

    #[test]
    fn aliases_write_the_same_bit() {
        let mut map = flags(0, 0, 0);
        map.set("gotthard", 1u8).unwrap();
        assert_eq!(map.get_int("gothard").unwrap(), 1);
        assert_eq!(map, flags(1, 0, 0));

        let err = map.set("Gothard", 1u8).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownField { suggestion: Some(name), .. } if name == "gothard"
        ));
        assert!(matches!(map.set("gothard", 2u8), Err(Error::ValueOverflow { .. })));
    }

    #[test]
    fn get_info_is_short_and_empty() {
        let request = Container::new(
            &GET_INFO_REQUEST,
            [
                ("device_index", Value::from(0x01u8)),
                ("feature_index", Value::from(0x07u8)),
            ],
        )
        .unwrap();
        assert_eq!(
            encode_message(&request).unwrap(),
            vec![0x10, 0x01, 0x07, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(encode_message(&request).unwrap().len(), SHORT_REPORT_LEN);
    }

    #[test]
    fn get_info_response_bit_maps() {
        let response = Container::new(
            &GET_INFO_RESPONSE,
            [
                ("device_index", Value::from(0x01u8)),
                ("feature_index", Value::from(0x07u8)),
                ("support_bit_map", Value::from(flags(1, 1, 1))),
                ("persist_bit_map", Value::from(0u8)),
                ("state_bit_map", Value::from(0x07u8)),
            ],
        )
        .unwrap();
        let frame = encode_message(&response).unwrap();
        let mut expected = vec![0x11, 0x01, 0x07, 0x00, 0x07, 0x00, 0x07];
        expected.resize(LONG_REPORT_LEN, 0);
        assert_eq!(frame, expected);

        let decoded = decode_message(&GET_INFO_RESPONSE, &frame, DecodeOptions::default()).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(decoded.get_container("state_bit_map").unwrap(), &flags(1, 1, 1));
    }

    #[test]
    fn disable_features_uses_long_report() {
        let request = Container::new(
            &DISABLE_FEATURES_REQUEST,
            [
                ("device_index", Value::from(0x01u8)),
                ("feature_index", Value::from(0x07u8)),
                ("disable_bit_map", Value::from(flags(0, 0, 1))),
            ],
        )
        .unwrap();
        let frame = encode_message(&request).unwrap();
        assert_eq!(frame.len(), LONG_REPORT_LEN);
        assert_eq!(&frame[..5], &[0x11, 0x01, 0x07, 0x10, 0x01]);
    }

    #[test]
    fn react_info_names_auth_feature() {
        let mut frame = vec![0x11, 0x01, 0x07, 0x30, 0x1E, 0x02];
        frame.resize(LONG_REPORT_LEN, 0);
        let response =
            decode_message(&GET_REACT_INFO_RESPONSE, &frame, DecodeOptions::default()).unwrap();
        assert_eq!(
            response.get_int("auth_feature").unwrap(),
            u64::from(features::MANAGE_DEACTIVATABLE_FEATURES_AUTH)
        );
    }
}
