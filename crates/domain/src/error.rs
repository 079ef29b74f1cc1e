//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::product::ProductError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The target aggregate has no recorded events.
    #[error("Aggregate {0} not found")]
    NotFound(AggregateId),

    /// The command failed validation against the current state.
    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] ProductError),

    /// A stored event carries a kind this build does not know.
    #[error("Unknown event kind: {kind}")]
    UnknownEventKind { kind: String },

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true if the command lost an optimistic concurrency race.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_concurrency_conflict())
    }
}
