//! Asynchronous in-process message bus.
//!
//! The bus decouples publishers from subscribers:
//! - [`MessageBus::publish`] enqueues into an unbounded FIFO and returns immediately
//! - a single delivery worker invokes every handler subscribed to a message's kind,
//!   in subscription order, one message at a time
//! - [`MessageBus::flush`] waits until everything published before the call was delivered
//! - [`MessageBus::stop`] drains the queue and shuts the worker down

pub mod bus;
pub mod error;
pub mod handler;

pub use bus::{BusState, BusStats, Message, MessageBus};
pub use error::{BusError, HandlerFailure, Result};
pub use handler::{EventHandler, FnHandler, HandlerError};
