//! Product commands.

use common::AggregateId;

use super::ProductError;
use super::aggregate::{validate_price, validate_stock};

/// Command to add a new product to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub cost_price: f64,
    pub supplier_id: i64,
    pub supplier_name: String,
    pub stock: i64,
}

impl CreateProduct {
    /// Creates a new CreateProduct command without a description.
    pub fn new(
        name: impl Into<String>,
        price: f64,
        cost_price: f64,
        supplier_id: i64,
        supplier_name: impl Into<String>,
        stock: i64,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            price,
            cost_price,
            supplier_id,
            supplier_name: supplier_name.into(),
            stock,
        }
    }

    /// Sets the product description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Checks the initial stock, price and cost price.
    pub fn validate(&self) -> Result<(), ProductError> {
        validate_stock(self.stock)?;
        validate_price(self.price)?;
        if !(self.cost_price.is_finite() && self.cost_price >= 0.0) {
            return Err(ProductError::InvalidCostPrice {
                cost_price: self.cost_price,
            });
        }
        Ok(())
    }
}

/// Command to replace a product's stock level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateStock {
    pub product_id: AggregateId,
    pub new_stock: i64,
}

impl UpdateStock {
    pub fn new(product_id: AggregateId, new_stock: i64) -> Self {
        Self {
            product_id,
            new_stock,
        }
    }
}

/// Command to replace a product's selling price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangePrice {
    pub product_id: AggregateId,
    pub new_price: f64,
}

impl ChangePrice {
    pub fn new(product_id: AggregateId, new_price: f64) -> Self {
        Self {
            product_id,
            new_price,
        }
    }
}

/// Command to count one view of a product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordProductView {
    pub product_id: AggregateId,
}

impl RecordProductView {
    pub fn new(product_id: AggregateId) -> Self {
        Self { product_id }
    }
}

/// Every command the product command handler accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateStock(UpdateStock),
    ChangePrice(ChangePrice),
    RecordProductView(RecordProductView),
}

impl ProductCommand {
    /// Command name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            ProductCommand::CreateProduct(_) => "CreateProduct",
            ProductCommand::UpdateStock(_) => "UpdateStock",
            ProductCommand::ChangePrice(_) => "ChangePrice",
            ProductCommand::RecordProductView(_) => "RecordProductView",
        }
    }
}

impl From<CreateProduct> for ProductCommand {
    fn from(cmd: CreateProduct) -> Self {
        ProductCommand::CreateProduct(cmd)
    }
}

impl From<UpdateStock> for ProductCommand {
    fn from(cmd: UpdateStock) -> Self {
        ProductCommand::UpdateStock(cmd)
    }
}

impl From<ChangePrice> for ProductCommand {
    fn from(cmd: ChangePrice) -> Self {
        ProductCommand::ChangePrice(cmd)
    }
}

impl From<RecordProductView> for ProductCommand {
    fn from(cmd: RecordProductView) -> Self {
        ProductCommand::RecordProductView(cmd)
    }
}
