//! Product aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;

pub use aggregate::Product;
pub use commands::{ChangePrice, CreateProduct, ProductCommand, RecordProductView, UpdateStock};
pub use events::{
    PriceChangedData, ProductCreatedData, ProductEvent, ProductEventKind, ProductViewedData,
    StockUpdatedData,
};
pub use service::{ProductBus, ProductCommandHandler};

use thiserror::Error;

/// Validation failures for product commands.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProductError {
    /// Stock levels cannot go below zero.
    #[error("Stock cannot be negative: {stock}")]
    NegativeStock { stock: i64 },

    /// Prices must be finite and strictly positive.
    #[error("Price must be positive: {price}")]
    InvalidPrice { price: f64 },

    /// Cost prices must be finite and not negative.
    #[error("Cost price cannot be negative: {cost_price}")]
    InvalidCostPrice { cost_price: f64 },

    /// The command targets a product with no creation event.
    #[error("Product has not been created")]
    NotCreated,
}
