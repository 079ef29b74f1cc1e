//! Application error type.

use domain::DomainError;
use event_store::EventStoreError;
use message_bus::BusError;
use projections::ProjectionError;
use thiserror::Error;

/// Errors surfaced by the catalog application.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    /// Logging or metrics could not be installed.
    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),
}
