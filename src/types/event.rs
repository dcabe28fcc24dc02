//! Event types for Event Sourcing
//!
//! An [`Event`] is one immutable record in an aggregate's append-only log.
//! The payload type `D` is chosen by the application, usually an
//! `#[serde(untagged)]` enum with one variant per event type, so that the
//! serialized `data` field holds only the variant's own payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form metadata attached to an event (correlation ids, user, ...)
pub type Metadata = Map<String, Value>;

/// An immutable event in an aggregate's log
///
/// Field names match the on-disk line format:
///
/// ```text
/// {"aggregate_id":"..","aggregate_type":"..","event_type":"..",
///  "timestamp":"<RFC3339>","version":1,"data":{..},"metadata":{..}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<D> {
    /// Aggregate instance this event belongs to
    pub aggregate_id: Uuid,

    /// Aggregate kind, e.g. `"Order"`
    pub aggregate_type: String,

    /// Tag selecting the payload decoder, e.g. `"order_created"`
    pub event_type: String,

    /// When the event occurred
    pub timestamp: DateTime<Utc>,

    /// Position in the aggregate's history, starting at 1
    pub version: u64,

    /// Event-specific payload
    pub data: D,

    #[serde(default)]
    pub metadata: Metadata,
}

impl<D> Event<D> {
    /// Create a new event stamped with the current time
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        version: u64,
        data: D,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            version,
            data,
            metadata: Metadata::new(),
        }
    }

    /// Replace the timestamp (replays, imports, deterministic tests)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Add one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Map the payload, keeping the envelope
    pub fn map_data<T>(self, f: impl FnOnce(D) -> T) -> Event<T> {
        Event {
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            event_type: self.event_type,
            timestamp: self.timestamp,
            version: self.version,
            data: f(self.data),
            metadata: self.metadata,
        }
    }
}

impl<D: Serialize> Event<D> {
    /// Serialize to a single JSON line (without the trailing newline)
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<D> std::fmt::Display for Event<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.event_type, self.version)
    }
}

/// The envelope of a stored event line, with the payload still undecoded
///
/// Decoding an event is a two-pass operation: the envelope is parsed first
/// to learn `event_type`, then `data` is handed to the decoder registered
/// for that type.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub version: u64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RawEvent {
    pub fn from_json_line(line: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(line)
    }

    /// Attach a decoded payload
    pub fn with_data<D>(self, data: D) -> Event<D> {
        Event {
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            event_type: self.event_type,
            timestamp: self.timestamp,
            version: self.version,
            data,
            metadata: self.metadata,
        }
    }
}

/// Just the version of a stored event line, for cheap "current version" reads
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct VersionProbe {
    pub version: u64,
}
