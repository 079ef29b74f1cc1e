//! Core aggregate and domain event traits.

use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{EventEnvelope, NewEvent, Sequence, Version};
use message_bus::Message;

use crate::error::DomainError;

/// The closed set of kinds an event type can take.
///
/// Kinds are what the event store records as `event_type` and what bus
/// subscriptions are keyed by.
pub trait EventKind: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Stable name stored alongside the payload.
    fn as_str(&self) -> &'static str;

    /// Parses a stored name back into a kind.
    fn parse(event_type: &str) -> Option<Self>;
}

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
///
/// The kind is stored once, as the envelope's `event_type`; the payload
/// holds only the kind-specific data.
pub trait DomainEvent: Send + Sync + Clone + 'static {
    /// The kind discriminant of this event type.
    type Kind: EventKind;

    /// Returns the kind of this event.
    fn kind(&self) -> Self::Kind;

    /// Returns the event type name.
    fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Serializes the event's data without its kind.
    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Rebuilds an event of `kind` from its serialized data.
    fn from_payload(kind: Self::Kind, payload: serde_json::Value)
    -> Result<Self, serde_json::Error>;

    /// Builds the store record for this event.
    fn to_new_event(
        &self,
        aggregate_id: AggregateId,
        occurred_at: DateTime<Utc>,
    ) -> Result<NewEvent, serde_json::Error> {
        Ok(NewEvent::new(
            aggregate_id,
            self.event_type(),
            occurred_at,
            self.to_payload()?,
        ))
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate's state is never stored; it is rebuilt by folding its
/// events in append order. Folding a prefix of the history gives the state
/// as of that version.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors command validation can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier, or None before creation.
    fn id(&self) -> Option<AggregateId>;

    /// Number of events folded into this state.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: Self::Event);

    /// Applies one more event and advances the version.
    fn replay(&mut self, event: Self::Event) {
        self.apply(event);
        self.set_version(self.version().next());
    }
}

/// A decoded event together with its position in the aggregate's history.
///
/// This is what gets published on the message bus after a successful append.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord<E> {
    /// The aggregate the event belongs to.
    pub aggregate_id: AggregateId,

    /// Store-assigned position within the aggregate.
    pub sequence: Sequence,

    /// When the event happened.
    pub occurred_at: DateTime<Utc>,

    /// The event itself.
    pub event: E,
}

impl<E: DomainEvent> EventRecord<E> {
    /// Decodes a stored envelope.
    ///
    /// The stored `event_type` alone decides the kind. Fails with
    /// `UnknownEventKind` when it names no known kind, and with
    /// `Serialization` when the payload is not that kind's data.
    pub fn decode(envelope: &EventEnvelope) -> Result<Self, DomainError> {
        let kind = E::Kind::parse(&envelope.event_type).ok_or_else(|| {
            DomainError::UnknownEventKind {
                kind: envelope.event_type.clone(),
            }
        })?;

        Ok(Self {
            aggregate_id: envelope.aggregate_id,
            sequence: envelope.sequence,
            occurred_at: envelope.occurred_at,
            event: E::from_payload(kind, envelope.payload.clone())?,
        })
    }

    /// Returns the kind of the wrapped event.
    pub fn kind(&self) -> E::Kind {
        self.event.kind()
    }
}

impl<E: DomainEvent> Message for EventRecord<E> {
    type Kind = E::Kind;

    fn kind(&self) -> E::Kind {
        self.event.kind()
    }
}

/// Rebuilds an aggregate by folding envelopes in order.
///
/// The envelopes must belong to one aggregate and start at sequence 0.
/// Passing a prefix of the history yields the state at that version.
pub fn reconstruct<A: Aggregate>(envelopes: &[EventEnvelope]) -> Result<A, DomainError> {
    let mut aggregate = A::default();
    for envelope in envelopes {
        let record = EventRecord::<A::Event>::decode(envelope)?;
        aggregate.replay(record.event);
    }
    Ok(aggregate)
}
