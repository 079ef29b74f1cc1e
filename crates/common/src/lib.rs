//! Shared types for the product catalog event-sourcing core.

mod types;

pub use types::AggregateId;
