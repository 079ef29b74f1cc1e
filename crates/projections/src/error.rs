//! Projection error types.

use domain::DomainError;
use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A stored event could not be decoded.
    #[error("Event decoding error: {0}")]
    Decode(#[from] DomainError),

    /// The row store rejected an operation.
    #[error("Read store error: {0}")]
    ReadStore(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
