//! High resolution wheel (0x2121), version 0.
//!
//! Function 0: getWheelCapability() → multiplier, invert and switch support
//! Function 1: getWheelMode() → invert, resolution, report target
//! Function 2: setWheelMode(invert, resolution, target)
//! Function 3: getRatchetSwitchState() → free wheel or ratchet
//!
//! Event 0: wheelMovement(resolution, periods, deltaV)
//! Event 1: ratchetSwitch(state)

use lazy_static::lazy_static;

use crate::check::Check;
use crate::container::Container;
use crate::error::Result;
use crate::feature::FeatureModel;
use crate::field::{Field, FieldBuilder};
use crate::hidpp::{features, MessageBuilder};
use crate::schema::{declare, Schema};

pub const VERSION: u8 = 0;

pub const GET_WHEEL_CAPABILITY: u8 = 0;
pub const GET_WHEEL_MODE: u8 = 1;
pub const SET_WHEEL_MODE: u8 = 2;
pub const GET_RATCHET_SWITCH: u8 = 3;

pub const WHEEL_MOVEMENT_EVENT: u8 = 0;
pub const RATCHET_SWITCH_EVENT: u8 = 1;

pub const FREE_WHEEL: u64 = 0;
pub const RATCHET_ENGAGED: u64 = 1;

pub const LOW_RESOLUTION: u64 = 0;
pub const HIGH_RESOLUTION: u64 = 1;

/// Wheel reports go through the HID mouse report.
pub const TARGET_HID: u64 = 0;
/// Wheel reports go through HID++ wheelMovement events.
pub const TARGET_HIDPP: u64 = 1;

fn reserved(name: &'static str, bits: usize) -> FieldBuilder {
    Field::bits(name, bits)
        .title("Reserved")
        .check(Check::width(bits))
        .default(0u8)
}

fn flag(name: &'static str, title: &'static str) -> FieldBuilder {
    Field::bits(name, 1).title(title).check(Check::width(1))
}

fn resolution() -> FieldBuilder {
    flag("resolution", "Resolution").interpret(&[
        (LOW_RESOLUTION, "low resolution"),
        (HIGH_RESOLUTION, "high resolution"),
    ])
}

fn target() -> FieldBuilder {
    flag("target", "Target").interpret(&[(TARGET_HID, "HID"), (TARGET_HIDPP, "HID++")])
}

fn ratchet_state() -> FieldBuilder {
    flag("state", "State")
        .interpret(&[(FREE_WHEEL, "free wheel"), (RATCHET_ENGAGED, "ratchet engaged")])
        .zero_print()
}

fn mode(builder: MessageBuilder) -> MessageBuilder {
    builder
        .field(reserved("reserved", 5))
        .field(flag("invert", "Invert"))
        .field(resolution())
        .field(target())
}

lazy_static! {
    pub static ref GET_WHEEL_CAPABILITY_REQUEST: Schema = declare(
        MessageBuilder::request("GetWheelCapability", features::HIRES_WHEEL, GET_WHEEL_CAPABILITY)
            .build()
    );

    pub static ref GET_WHEEL_CAPABILITY_RESPONSE: Schema = declare(
        MessageBuilder::response(
            "GetWheelCapabilityResponse",
            features::HIRES_WHEEL,
            GET_WHEEL_CAPABILITY,
        )
        .version(VERSION)
        .field(
            Field::bytes("multiplier", 1)
                .title("Multiplier")
                .check(Check::byte())
                .zero_print(),
        )
        .field(reserved("reserved1", 4))
        .field(flag("has_invert", "Has Invert"))
        .field(flag("has_switch", "Has Switch"))
        .field(reserved("reserved2", 2))
        .build()
    );

    pub static ref GET_WHEEL_MODE_REQUEST: Schema = declare(
        MessageBuilder::request("GetWheelMode", features::HIRES_WHEEL, GET_WHEEL_MODE).build()
    );

    pub static ref GET_WHEEL_MODE_RESPONSE: Schema = declare(
        mode(MessageBuilder::response("GetWheelModeResponse", features::HIRES_WHEEL, GET_WHEEL_MODE))
            .version(VERSION)
            .build()
    );

    pub static ref SET_WHEEL_MODE_REQUEST: Schema = declare(
        mode(MessageBuilder::request("SetWheelMode", features::HIRES_WHEEL, SET_WHEEL_MODE))
            .version(VERSION)
            .build()
    );

    pub static ref SET_WHEEL_MODE_RESPONSE: Schema = declare(
        mode(MessageBuilder::response("SetWheelModeResponse", features::HIRES_WHEEL, SET_WHEEL_MODE))
            .version(VERSION)
            .build()
    );

    pub static ref GET_RATCHET_SWITCH_STATE_REQUEST: Schema = declare(
        MessageBuilder::request("GetRatchetSwitchState", features::HIRES_WHEEL, GET_RATCHET_SWITCH)
            .build()
    );

    pub static ref GET_RATCHET_SWITCH_STATE_RESPONSE: Schema = declare(
        MessageBuilder::response(
            "GetRatchetSwitchStateResponse",
            features::HIRES_WHEEL,
            GET_RATCHET_SWITCH,
        )
        .field(reserved("reserved", 7))
        .field(ratchet_state())
        .build()
    );

    pub static ref WHEEL_MOVEMENT_EVENT_SCHEMA: Schema = declare(
        MessageBuilder::event("WheelMovementEvent", features::HIRES_WHEEL, WHEEL_MOVEMENT_EVENT)
            .field(reserved("reserved", 3))
            .field(resolution())
            .field(
                Field::bits("periods", 4)
                    .title("Periods")
                    .check(Check::width(4)),
            )
            .field(
                Field::bytes("delta_v", 2)
                    .title("Delta V")
                    .check(Check::width(16))
                    .zero_print(),
            )
            .build()
    );

    pub static ref RATCHET_SWITCH_EVENT_SCHEMA: Schema = declare(
        MessageBuilder::event("RatchetSwitchEvent", features::HIRES_WHEEL, RATCHET_SWITCH_EVENT)
            .field(reserved("reserved", 7))
            .field(ratchet_state())
            .build()
    );

    pub static ref MODEL: FeatureModel = FeatureModel::new("HiResWheel", features::HIRES_WHEEL, VERSION)
        .function(
            GET_WHEEL_CAPABILITY,
            &GET_WHEEL_CAPABILITY_REQUEST,
            &GET_WHEEL_CAPABILITY_RESPONSE,
        )
        .function(GET_WHEEL_MODE, &GET_WHEEL_MODE_REQUEST, &GET_WHEEL_MODE_RESPONSE)
        .function(SET_WHEEL_MODE, &SET_WHEEL_MODE_REQUEST, &SET_WHEEL_MODE_RESPONSE)
        .function(
            GET_RATCHET_SWITCH,
            &GET_RATCHET_SWITCH_STATE_REQUEST,
            &GET_RATCHET_SWITCH_STATE_RESPONSE,
        )
        .event(WHEEL_MOVEMENT_EVENT, &WHEEL_MOVEMENT_EVENT_SCHEMA)
        .event(RATCHET_SWITCH_EVENT, &RATCHET_SWITCH_EVENT_SCHEMA);
}

/// Signed vertical movement carried by a wheel movement event.
pub fn delta_vertical(event: &Container) -> Result<i16> {
    Ok(event.get_int("delta_v")? as u16 as i16)
}
