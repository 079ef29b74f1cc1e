//! Product domain events.

use std::fmt;

use common::AggregateId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::{DomainEvent, EventKind};

/// Kinds of product events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductEventKind {
    ProductCreated,
    StockUpdated,
    PriceChanged,
    ProductViewed,
}

impl ProductEventKind {
    /// Every kind, in declaration order.
    pub const ALL: [ProductEventKind; 4] = [
        ProductEventKind::ProductCreated,
        ProductEventKind::StockUpdated,
        ProductEventKind::PriceChanged,
        ProductEventKind::ProductViewed,
    ];
}

impl EventKind for ProductEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            ProductEventKind::ProductCreated => "ProductCreated",
            ProductEventKind::StockUpdated => "StockUpdated",
            ProductEventKind::PriceChanged => "PriceChanged",
            ProductEventKind::ProductViewed => "ProductViewed",
        }
    }

    fn parse(event_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == event_type)
    }
}

impl fmt::Display for ProductEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that can occur on a product aggregate.
///
/// Only the variant's data is persisted. Each data type rejects fields it
/// does not know, so data recorded for one kind never reads as another.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductEvent {
    /// Product was added to the catalog.
    ProductCreated(ProductCreatedData),

    /// Stock level was replaced.
    StockUpdated(StockUpdatedData),

    /// Selling price was replaced.
    PriceChanged(PriceChangedData),

    /// Product page was viewed once.
    ProductViewed(ProductViewedData),
}

impl DomainEvent for ProductEvent {
    type Kind = ProductEventKind;

    fn kind(&self) -> ProductEventKind {
        match self {
            ProductEvent::ProductCreated(_) => ProductEventKind::ProductCreated,
            ProductEvent::StockUpdated(_) => ProductEventKind::StockUpdated,
            ProductEvent::PriceChanged(_) => ProductEventKind::PriceChanged,
            ProductEvent::ProductViewed(_) => ProductEventKind::ProductViewed,
        }
    }

    fn to_payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            ProductEvent::ProductCreated(data) => serde_json::to_value(data),
            ProductEvent::StockUpdated(data) => serde_json::to_value(data),
            ProductEvent::PriceChanged(data) => serde_json::to_value(data),
            ProductEvent::ProductViewed(data) => serde_json::to_value(data),
        }
    }

    fn from_payload(kind: ProductEventKind, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ProductEventKind::ProductCreated => {
                ProductEvent::ProductCreated(serde_json::from_value(payload)?)
            }
            ProductEventKind::StockUpdated => {
                ProductEvent::StockUpdated(serde_json::from_value(payload)?)
            }
            ProductEventKind::PriceChanged => {
                ProductEvent::PriceChanged(serde_json::from_value(payload)?)
            }
            ProductEventKind::ProductViewed => {
                ProductEvent::ProductViewed(serde_json::from_value(payload)?)
            }
        })
    }
}

impl ProductEvent {
    /// Builds a creation event without a description.
    pub fn created(
        product_id: AggregateId,
        name: impl Into<String>,
        price: f64,
        cost_price: f64,
        supplier_id: i64,
        supplier_name: impl Into<String>,
        stock: i64,
    ) -> Self {
        ProductEvent::ProductCreated(ProductCreatedData {
            product_id,
            name: name.into(),
            description: None,
            price,
            cost_price,
            supplier_id,
            supplier_name: supplier_name.into(),
            stock,
        })
    }

    pub fn stock_updated(product_id: AggregateId, new_stock: i64) -> Self {
        ProductEvent::StockUpdated(StockUpdatedData {
            product_id,
            new_stock,
        })
    }

    pub fn price_changed(product_id: AggregateId, new_price: f64) -> Self {
        ProductEvent::PriceChanged(PriceChangedData {
            product_id,
            new_price,
        })
    }

    pub fn viewed(product_id: AggregateId) -> Self {
        ProductEvent::ProductViewed(ProductViewedData { product_id })
    }

    /// The product this event belongs to.
    pub fn product_id(&self) -> AggregateId {
        match self {
            ProductEvent::ProductCreated(data) => data.product_id,
            ProductEvent::StockUpdated(data) => data.product_id,
            ProductEvent::PriceChanged(data) => data.product_id,
            ProductEvent::ProductViewed(data) => data.product_id,
        }
    }
}

/// Data for ProductCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductCreatedData {
    pub product_id: AggregateId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    pub cost_price: f64,
    pub supplier_id: i64,
    pub supplier_name: String,
    pub stock: i64,
}

/// Data for StockUpdated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StockUpdatedData {
    pub product_id: AggregateId,
    pub new_stock: i64,
}

/// Data for PriceChanged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceChangedData {
    pub product_id: AggregateId,
    pub new_price: f64,
}

/// Data for ProductViewed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductViewedData {
    pub product_id: AggregateId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in ProductEventKind::ALL {
            assert_eq!(ProductEventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProductEventKind::parse("OrderCreated"), None);
    }

    #[test]
    fn payload_round_trips_through_kind() {
        let id = AggregateId::new(4);
        let events = [
            ProductEvent::created(id, "Widget Pro", 29.99, 12.0, 1, "Acme Corp", 100),
            ProductEvent::stock_updated(id, 8),
            ProductEvent::price_changed(id, 19.5),
            ProductEvent::viewed(id),
        ];

        for event in events {
            let payload = event.to_payload().unwrap();
            assert!(payload.get("type").is_none());
            assert_eq!(ProductEvent::from_payload(event.kind(), payload).unwrap(), event);
        }
    }

    #[test]
    fn missing_description_decodes_as_none() {
        let json = serde_json::json!({
            "product_id": 1,
            "name": "Widget Pro",
            "price": 29.99,
            "cost_price": 12.0,
            "supplier_id": 1,
            "supplier_name": "Acme Corp",
            "stock": 100
        });

        let event = ProductEvent::from_payload(ProductEventKind::ProductCreated, json).unwrap();

        match event {
            ProductEvent::ProductCreated(data) => {
                assert_eq!(data.description, None);
                assert_eq!(data.stock, 100);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn data_of_another_kind_is_rejected() {
        let payload = ProductEvent::price_changed(AggregateId::new(1), 5.0)
            .to_payload()
            .unwrap();

        assert!(ProductEvent::from_payload(ProductEventKind::StockUpdated, payload.clone()).is_err());
        assert!(ProductEvent::from_payload(ProductEventKind::ProductViewed, payload).is_err());
    }

    #[test]
    fn product_id_is_available_for_every_kind() {
        let id = AggregateId::new(12);
        let events = [
            ProductEvent::created(id, "A", 1.0, 0.5, 1, "S", 0),
            ProductEvent::stock_updated(id, 1),
            ProductEvent::price_changed(id, 2.0),
            ProductEvent::viewed(id),
        ];

        assert!(events.iter().all(|e| e.product_id() == id));
    }
}
