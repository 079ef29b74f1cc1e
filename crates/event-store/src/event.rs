use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AggregateId;

/// Unique identifier for a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event within its aggregate's stream.
///
/// Assigned by the store at append time. The first event of an aggregate
/// is at sequence 0 and every following event is exactly one greater.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    /// Creates a sequence number from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the sequence number of an aggregate's first event.
    pub fn first() -> Self {
        Self(0)
    }

    /// Returns the next sequence number.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the aggregate version once the event at this sequence is recorded.
    pub fn version_after(&self) -> Version {
        Version(self.0 + 1)
    }

    /// Returns the raw sequence value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of events recorded for an aggregate.
///
/// A version of 0 means the aggregate has no events. It is used both as the
/// aggregate's version after replay and as the expected version for
/// optimistic concurrency control.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) of an aggregate with no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the sequence number the next appended event will receive.
    pub fn next_sequence(&self) -> Sequence {
        Sequence(self.0)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// An event ready to be appended.
///
/// Carries everything the caller decides: the target aggregate, the event
/// kind, the serialized payload and the time the event occurred. The store
/// adds the sequence number and event ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// The kind of the event (e.g., "ProductCreated", "StockUpdated").
    pub event_type: String,

    /// When the event occurred, as assigned by the emitter.
    pub occurred_at: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,
}

impl NewEvent {
    /// Creates a new event from a raw JSON payload.
    pub fn new(
        aggregate_id: AggregateId,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_id,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    /// Creates a new event by serializing a payload.
    pub fn from_payload<T: Serialize>(
        aggregate_id: AggregateId,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            aggregate_id,
            event_type,
            occurred_at,
            serde_json::to_value(payload)?,
        ))
    }
}

/// A recorded event together with its storage metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// Position of this event within the aggregate's stream.
    pub sequence: Sequence,

    /// The kind of the event.
    pub event_type: String,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Records a new event at the given sequence number.
    pub fn record(event: NewEvent, sequence: Sequence) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_id: event.aggregate_id,
            sequence,
            event_type: event.event_type,
            occurred_at: event.occurred_at,
            payload: event.payload,
        }
    }

    /// Deserializes the payload into a concrete type.
    pub fn decode_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn sequence_starts_at_zero_and_tracks_version() {
        assert_eq!(Sequence::first().as_i64(), 0);
        assert_eq!(Sequence::first().next(), Sequence::new(1));
        assert_eq!(Sequence::first().version_after(), Version::new(1));
        assert_eq!(Version::initial().next_sequence(), Sequence::first());
        assert_eq!(Version::new(3).next_sequence(), Sequence::new(3));
    }

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
    }

    #[test]
    fn record_keeps_caller_fields() {
        let occurred_at = Utc::now();
        let payload = serde_json::json!({"new_stock": 5});
        let event = NewEvent::new(
            AggregateId::new(1),
            "StockUpdated",
            occurred_at,
            payload.clone(),
        );

        let envelope = EventEnvelope::record(event, Sequence::new(4));

        assert_eq!(envelope.aggregate_id, AggregateId::new(1));
        assert_eq!(envelope.sequence, Sequence::new(4));
        assert_eq!(envelope.event_type, "StockUpdated");
        assert_eq!(envelope.occurred_at, occurred_at);
        assert_eq!(envelope.payload, payload);
    }

    #[test]
    fn from_payload_serializes_value() {
        #[derive(Serialize)]
        struct Payload {
            new_price: f64,
        }

        let event = NewEvent::from_payload(
            AggregateId::new(2),
            "PriceChanged",
            Utc::now(),
            &Payload { new_price: 44.99 },
        )
        .unwrap();

        assert_eq!(event.payload, serde_json::json!({"new_price": 44.99}));
    }
}
