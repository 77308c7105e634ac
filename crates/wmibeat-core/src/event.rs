//! Events produced by the engine

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use wmibeat_provider::RawValue;

/// Discriminator carried in every event's `type` key
pub const EVENT_TYPE: &str = "wmibeat";

/// Coerced field values of one result row, keyed by field name
pub type FieldSet = BTreeMap<String, RawValue>;

/// One published event, built from one result row
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Queried class
    pub class: String,
    /// Capture time, set when the event is emitted
    pub timestamp: DateTime<Utc>,
    /// Extracted fields
    pub fields: FieldSet,
}

impl Event {
    /// Create an event stamped with `timestamp`
    pub fn new(class: impl Into<String>, fields: FieldSet, timestamp: DateTime<Utc>) -> Self {
        Self {
            class: class.into(),
            timestamp,
            fields,
        }
    }

    /// Event discriminator
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        EVENT_TYPE
    }
}

const RESERVED_KEYS: [&str; 3] = ["class", "type", "timestamp"];

// Flat layout: {"class", "type", "timestamp", <fields>...}. Fields that
// collide with a reserved key are not serialized.
impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields: Vec<_> = self
            .fields
            .iter()
            .filter(|(name, _)| !RESERVED_KEYS.contains(&name.as_str()))
            .collect();

        let mut map = serializer.serialize_map(Some(RESERVED_KEYS.len() + fields.len()))?;
        map.serialize_entry("class", &self.class)?;
        map.serialize_entry("type", EVENT_TYPE)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        for (name, value) in fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
