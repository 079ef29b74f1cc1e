//! Domain layer for the product catalog.
//!
//! This crate provides:
//! - `Aggregate` and `DomainEvent` traits with replay from stored envelopes
//! - a generic `CommandHandler` that validates against replayed state and appends
//! - the `Product` aggregate, its events and commands
//! - `ProductCommandHandler`, which publishes appended events to the message bus

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod product;

pub use aggregate::{Aggregate, DomainEvent, EventKind, EventRecord, reconstruct};
pub use clock::{Clock, FixedClock, SystemClock};
pub use command::{CommandHandler, CommandResult, ConcurrencyMode};
pub use error::DomainError;
pub use product::{
    ChangePrice, CreateProduct, PriceChangedData, Product, ProductBus, ProductCommand,
    ProductCommandHandler, ProductCreatedData, ProductError, ProductEvent, ProductEventKind,
    ProductViewedData, RecordProductView, StockUpdatedData, UpdateStock,
};
