use std::{collections::HashMap, fmt};

use serde::Serialize;

use crate::{
    error::{RelayError, Result},
    events::ObjectPayload,
};

/// Kind of change reported by a Cloud Storage notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventType {
    ObjectFinalize,
    ObjectDelete,
    ObjectMetadataUpdate,
    ObjectArchive,
    Other(String),
}

impl EventType {
    pub fn parse(value: &str) -> Self {
        match value {
            "OBJECT_FINALIZE" => EventType::ObjectFinalize,
            "OBJECT_DELETE" => EventType::ObjectDelete,
            "OBJECT_METADATA_UPDATE" => EventType::ObjectMetadataUpdate,
            "OBJECT_ARCHIVE" => EventType::ObjectArchive,
            other => EventType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::ObjectFinalize => "OBJECT_FINALIZE",
            EventType::ObjectDelete => "OBJECT_DELETE",
            EventType::ObjectMetadataUpdate => "OBJECT_METADATA_UPDATE",
            EventType::ObjectArchive => "OBJECT_ARCHIVE",
            EventType::Other(other) => other,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PayloadFormat {
    JsonApiV1,
    None,
    Other(String),
}

impl PayloadFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "JSON_API_V1" => PayloadFormat::JsonApiV1,
            "NONE" => PayloadFormat::None,
            other => PayloadFormat::Other(other.to_string()),
        }
    }
}

/// A storage change notification as delivered by the broker.
#[derive(Debug, Clone, Serialize)]
pub struct StorageEvent {
    pub event_type: EventType,
    pub bucket_id: String,
    pub object_id: String,
    pub generation: String,
    pub overwrote_generation: Option<String>,
    pub overwritten_by_generation: Option<String>,
    pub payload_format: PayloadFormat,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl StorageEvent {
    pub const EVENT_TYPE: &'static str = "eventType";
    pub const BUCKET_ID: &'static str = "bucketId";
    pub const OBJECT_ID: &'static str = "objectId";
    pub const OBJECT_GENERATION: &'static str = "objectGeneration";
    pub const PAYLOAD_FORMAT: &'static str = "payloadFormat";
    pub const OVERWROTE_GENERATION: &'static str = "overwroteGeneration";
    pub const OVERWRITTEN_BY_GENERATION: &'static str = "overwrittenByGeneration";

    pub fn from_delivery(attributes: &HashMap<String, String>, data: Vec<u8>) -> Result<Self> {
        let required = |key: &'static str| {
            attributes
                .get(key)
                .cloned()
                .ok_or(RelayError::MissingAttribute(key))
        };

        Ok(Self {
            event_type: EventType::parse(&required(Self::EVENT_TYPE)?),
            bucket_id: required(Self::BUCKET_ID)?,
            object_id: required(Self::OBJECT_ID)?,
            generation: required(Self::OBJECT_GENERATION)?,
            overwrote_generation: attributes.get(Self::OVERWROTE_GENERATION).cloned(),
            overwritten_by_generation: attributes.get(Self::OVERWRITTEN_BY_GENERATION).cloned(),
            payload_format: PayloadFormat::parse(&required(Self::PAYLOAD_FORMAT)?),
            data,
        })
    }

    /// Parsed object resource, only present for `JSON_API_V1` notifications.
    pub fn object_payload(&self) -> Result<Option<ObjectPayload>> {
        match self.payload_format {
            PayloadFormat::JsonApiV1 => Ok(Some(serde_json::from_slice(&self.data)?)),
            _ => Ok(None),
        }
    }

    /// Base name of the object, i.e. everything after the last `/`.
    pub fn image_name(&self) -> &str {
        self.object_id
            .rsplit('/')
            .next()
            .unwrap_or(self.object_id.as_str())
    }

    pub fn is_finalize(&self) -> bool {
        self.event_type == EventType::ObjectFinalize
    }
}
