//! HID++ 2.0 feature models.
//!
//! A feature model ties the message schemas of one feature together:
//! request/response pairs per function index and events per event index.
//! Responses and events are recognised from their header and decoded with
//! the matching schema.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::codec::DecodeOptions;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::hidpp::{decode_message, Header, DEFAULT_SOFTWARE_ID};
use crate::schema::Schema;
use crate::{deactivatable_features, hires_wheel, root};

/// Request and response layouts of one feature function.
#[derive(Debug, Clone, Copy)]
pub struct Function {
    pub request: &'static Schema,
    pub response: &'static Schema,
}

#[derive(Debug)]
pub struct FeatureModel {
    name: &'static str,
    id: u16,
    version: u8,
    functions: BTreeMap<u8, Function>,
    events: BTreeMap<u8, &'static Schema>,
}

impl FeatureModel {
    pub fn new(name: &'static str, id: u16, version: u8) -> Self {
        Self {
            name,
            id,
            version,
            functions: BTreeMap::new(),
            events: BTreeMap::new(),
        }
    }

    pub fn function(
        mut self,
        index: u8,
        request: &'static Schema,
        response: &'static Schema,
    ) -> Self {
        self.functions.insert(index, Function { request, response });
        self
    }

    pub fn event(mut self, index: u8, schema: &'static Schema) -> Self {
        self.events.insert(index, schema);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn functions(&self) -> impl Iterator<Item = (u8, Function)> + '_ {
        self.functions.iter().map(|(index, f)| (*index, *f))
    }

    pub fn events(&self) -> impl Iterator<Item = (u8, &'static Schema)> + '_ {
        self.events.iter().map(|(index, schema)| (*index, *schema))
    }

    pub fn request(&self, function: u8) -> Option<&'static Schema> {
        self.functions.get(&function).map(|f| f.request)
    }

    pub fn response(&self, function: u8) -> Option<&'static Schema> {
        self.functions.get(&function).map(|f| f.response)
    }

    pub fn event_schema(&self, index: u8) -> Option<&'static Schema> {
        self.events.get(&index).copied()
    }

    /// Every schema of the feature: requests, responses, then events.
    pub fn schemas(&self) -> impl Iterator<Item = &'static Schema> + '_ {
        self.functions
            .values()
            .flat_map(|f| [f.request, f.response])
            .chain(self.events.values().copied())
    }

    /// Decodes `frame` as the response to `request`.
    ///
    /// Returns `Ok(None)` when the frame answers something else: another
    /// device, feature index or function. A HID++ error report for the
    /// request becomes [`Error::DeviceError`].
    pub fn match_response(&self, request: &Container, frame: &[u8]) -> Result<Option<Container>> {
        let sent = Header::of(request)?;
        let received = Header::parse(frame)?;
        if received.device_index != sent.device_index {
            return Ok(None);
        }

        if received.is_error() {
            return match frame.get(3..6) {
                Some(&[feature_index, function_sw, code])
                    if feature_index == sent.feature_index
                        && function_sw >> 4 == sent.function_index =>
                {
                    warn!(
                        feature = self.name,
                        feature_index,
                        function = sent.function_index,
                        error_code = code,
                        "HID++ error response"
                    );
                    Err(Error::DeviceError {
                        feature_index,
                        function_index: sent.function_index,
                        code,
                    })
                }
                _ => Ok(None),
            };
        }

        if received.feature_index != sent.feature_index
            || received.function_index != sent.function_index
        {
            debug!(
                feature = self.name,
                feature_index = received.feature_index,
                function = received.function_index,
                "frame does not answer the request"
            );
            return Ok(None);
        }
        let Some(schema) = self.response(sent.function_index) else {
            return Ok(None);
        };
        decode_message(schema, frame, DecodeOptions::default()).map(Some)
    }

    /// Decodes `frame` as one of the feature's events, when the feature sits
    /// at `feature_index` on the device.
    ///
    /// Events are unsolicited and always carry the default software ID.
    pub fn match_event(&self, feature_index: u8, frame: &[u8]) -> Result<Option<Container>> {
        let header = Header::parse(frame)?;
        if header.feature_index != feature_index || header.software_id != DEFAULT_SOFTWARE_ID {
            return Ok(None);
        }
        match self.event_schema(header.function_index) {
            Some(schema) => decode_message(schema, frame, DecodeOptions::default()).map(Some),
            None => Ok(None),
        }
    }
}

lazy_static! {
    static ref MODELS: Vec<&'static FeatureModel> = vec![
        &*root::MODEL,
        &*deactivatable_features::MODEL,
        &*hires_wheel::MODEL,
    ];
}

/// Every feature model with layouts in this crate, by ascending feature ID.
pub fn models() -> &'static [&'static FeatureModel] {
    &MODELS
}

pub fn find_model(id: u16) -> Option<&'static FeatureModel> {
    models().iter().copied().find(|model| model.id() == id)
}

/// Looks a message schema up by name, ignoring case.
pub fn find_schema(name: &str) -> Option<&'static Schema> {
    models()
        .iter()
        .flat_map(|model| model.schemas())
        .find(|schema| schema.name().eq_ignore_ascii_case(name))
}
