//! Product aggregate implementation.

use common::AggregateId;
use event_store::Version;
use serde::Serialize;

use crate::aggregate::Aggregate;

use super::{CreateProduct, ProductError, ProductEvent};

/// Product aggregate root.
///
/// Holds the state obtained by folding a product's events. Command methods
/// validate against this state and return the events to record; they never
/// mutate it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Product {
    id: Option<AggregateId>,
    name: String,
    description: Option<String>,
    price: f64,
    cost_price: f64,
    supplier_id: Option<i64>,
    supplier_name: String,
    stock: i64,
    view_count: u64,
    version: Version,
}

impl Product {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn cost_price(&self) -> f64 {
        self.cost_price
    }

    pub fn supplier_id(&self) -> Option<i64> {
        self.supplier_id
    }

    pub fn supplier_name(&self) -> &str {
        &self.supplier_name
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    /// Number of recorded views.
    pub fn view_count(&self) -> u64 {
        self.view_count
    }

    /// Returns true once the creation event has been applied.
    pub fn is_created(&self) -> bool {
        self.id.is_some()
    }

    // Command methods

    /// Produces the creation event for a freshly allocated identifier.
    pub fn create(
        product_id: AggregateId,
        cmd: &CreateProduct,
    ) -> Result<Vec<ProductEvent>, ProductError> {
        cmd.validate()?;

        Ok(vec![ProductEvent::ProductCreated(
            super::ProductCreatedData {
                product_id,
                name: cmd.name.clone(),
                description: cmd.description.clone(),
                price: cmd.price,
                cost_price: cmd.cost_price,
                supplier_id: cmd.supplier_id,
                supplier_name: cmd.supplier_name.clone(),
                stock: cmd.stock,
            },
        )])
    }

    /// Replaces the stock level.
    pub fn update_stock(&self, new_stock: i64) -> Result<Vec<ProductEvent>, ProductError> {
        let id = self.require_created()?;
        validate_stock(new_stock)?;
        Ok(vec![ProductEvent::stock_updated(id, new_stock)])
    }

    /// Replaces the selling price.
    pub fn change_price(&self, new_price: f64) -> Result<Vec<ProductEvent>, ProductError> {
        let id = self.require_created()?;
        validate_price(new_price)?;
        Ok(vec![ProductEvent::price_changed(id, new_price)])
    }

    /// Records one view of the product.
    pub fn record_view(&self) -> Result<Vec<ProductEvent>, ProductError> {
        let id = self.require_created()?;
        Ok(vec![ProductEvent::viewed(id)])
    }

    fn require_created(&self) -> Result<AggregateId, ProductError> {
        self.id.ok_or(ProductError::NotCreated)
    }
}

pub(crate) fn validate_stock(stock: i64) -> Result<(), ProductError> {
    if stock < 0 {
        return Err(ProductError::NegativeStock { stock });
    }
    Ok(())
}

pub(crate) fn validate_price(price: f64) -> Result<(), ProductError> {
    // Rejects NaN as well as zero and negatives.
    if !(price.is_finite() && price > 0.0) {
        return Err(ProductError::InvalidPrice { price });
    }
    Ok(())
}

impl Aggregate for Product {
    type Event = ProductEvent;
    type Error = ProductError;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: ProductEvent) {
        match event {
            ProductEvent::ProductCreated(data) => {
                self.id = Some(data.product_id);
                self.name = data.name;
                self.description = data.description;
                self.price = data.price;
                self.cost_price = data.cost_price;
                self.supplier_id = Some(data.supplier_id);
                self.supplier_name = data.supplier_name;
                self.stock = data.stock;
            }
            ProductEvent::StockUpdated(data) => {
                self.stock = data.new_stock;
            }
            ProductEvent::PriceChanged(data) => {
                self.price = data.new_price;
            }
            ProductEvent::ProductViewed(_) => {
                self.view_count += 1;
            }
        }
    }
}
