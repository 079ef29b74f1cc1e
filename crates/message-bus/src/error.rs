//! Message bus error types.

use thiserror::Error;

use crate::bus::BusState;

/// Errors returned by bus lifecycle operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The operation is not allowed in the bus's current state.
    #[error("Cannot {operation} message bus in {state} state")]
    InvalidState {
        operation: &'static str,
        state: BusState,
    },

    /// Published messages are pending but no worker will deliver them.
    #[error("Message bus is {state}: {pending} published messages will not be delivered")]
    NotRunning { state: BusState, pending: u64 },

    /// The delivery worker terminated abnormally.
    #[error("Delivery worker failed: {0}")]
    Worker(String),
}

/// A subscriber that failed while handling a message.
///
/// Failures are caught at the bus boundary and logged; they never reach the
/// publisher and never prevent other handlers from running.
#[derive(Debug, Clone, Error)]
#[error("Handler '{handler}' failed on {kind}: {reason}")]
pub struct HandlerFailure {
    /// Name of the failing handler.
    pub handler: String,

    /// Kind of the message being delivered.
    pub kind: String,

    /// The error message or panic payload.
    pub reason: String,
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
