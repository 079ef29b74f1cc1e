//! Read models, projector and queries for the CQRS query side.
//!
//! This crate provides the query side of the product catalog:
//! - [`ProductDetail`] and [`ProductSummary`] rows behind the [`ReadStore`] trait
//! - [`InMemoryReadStore`], the row store used by tests and local runs
//! - [`Projector`], which folds product events into rows and can rebuild them from the log
//! - [`QueryHandler`] for detail, card, list and search queries

pub mod error;
pub mod projector;
pub mod query;
pub mod read_model;

pub use error::{ProjectionError, Result};
pub use projector::Projector;
pub use query::{ProductQuery, QueryHandler, QueryResponse};
pub use read_model::{InMemoryReadStore, ProductCard, ProductDetail, ProductSummary, ReadStore};
