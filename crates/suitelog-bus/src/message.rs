//! Log message payloads and their string-attribute envelope.

use std::collections::BTreeMap;

use crate::DecodeError;

pub const ATTR_NAME: &str = "name";
pub const ATTR_STATUS: &str = "status";
pub const ATTR_RUN_NAME: &str = "runName";
pub const ATTR_COMPLETION_TIME: &str = "completionTime";
pub const ATTR_PLATFORM: &str = "platform";

/// Typed view of the attribute map attached to every published log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttributes {
    pub name: String,
    pub status: String,
    pub run_name: String,
    pub completion_time: String,
    pub platform: String,
}

impl MessageAttributes {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ATTR_NAME.to_string(), self.name.clone()),
            (ATTR_STATUS.to_string(), self.status.clone()),
            (ATTR_RUN_NAME.to_string(), self.run_name.clone()),
            (ATTR_COMPLETION_TIME.to_string(), self.completion_time.clone()),
            (ATTR_PLATFORM.to_string(), self.platform.clone()),
        ])
    }

    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, DecodeError> {
        let required = |key: &'static str| {
            map.get(key)
                .cloned()
                .ok_or(DecodeError::MissingAttribute(key))
        };
        Ok(Self {
            name: required(ATTR_NAME)?,
            status: required(ATTR_STATUS)?,
            run_name: required(ATTR_RUN_NAME)?,
            completion_time: required(ATTR_COMPLETION_TIME)?,
            platform: required(ATTR_PLATFORM)?,
        })
    }
}

/// The unit shipped over the bus: raw log bytes plus string attributes.
///
/// The payload is exactly the buffer the log-stream reader produced; nothing
/// re-frames or re-encodes it beyond the transport's base64 envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub payload: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
}

impl LogMessage {
    pub fn new(payload: Vec<u8>, attributes: &MessageAttributes) -> Self {
        Self {
            payload,
            attributes: attributes.to_map(),
        }
    }

    pub fn typed_attributes(&self) -> Result<MessageAttributes, DecodeError> {
        MessageAttributes::from_map(&self.attributes)
    }
}
