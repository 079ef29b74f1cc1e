//! Queries answered from the read model.

use common::AggregateId;

use crate::Result;
use crate::read_model::{ProductCard, ProductDetail, ProductSummary, ReadStore};

/// Every query the read side answers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductQuery {
    /// Full detail row for one product.
    GetProductDetail(AggregateId),
    /// Public card for one product.
    GetProductCard(AggregateId),
    /// All products ordered by id.
    ListProducts,
    /// Products whose name contains the text, ignoring case.
    SearchProducts(String),
}

/// Answer to a [`ProductQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResponse {
    Detail(Option<ProductDetail>),
    Card(Option<ProductCard>),
    Products(Vec<ProductSummary>),
}

/// Read-only access to the product views.
///
/// Results reflect whatever the projector has written so far; call
/// `flush` on the bus first to see every event published before.
pub struct QueryHandler<R: ReadStore> {
    rows: R,
}

impl<R: ReadStore> QueryHandler<R> {
    pub fn new(rows: R) -> Self {
        Self { rows }
    }

    /// Dispatches a query.
    pub async fn handle(&self, query: ProductQuery) -> Result<QueryResponse> {
        Ok(match query {
            ProductQuery::GetProductDetail(id) => QueryResponse::Detail(self.product_detail(id).await?),
            ProductQuery::GetProductCard(id) => QueryResponse::Card(self.product_card(id).await?),
            ProductQuery::ListProducts => QueryResponse::Products(self.list_products().await?),
            ProductQuery::SearchProducts(text) => {
                QueryResponse::Products(self.search_products(&text).await?)
            }
        })
    }

    pub async fn product_detail(&self, id: AggregateId) -> Result<Option<ProductDetail>> {
        self.rows.get_detail(id).await
    }

    pub async fn product_card(&self, id: AggregateId) -> Result<Option<ProductCard>> {
        Ok(self.rows.get_summary(id).await?.as_ref().map(ProductCard::from))
    }

    pub async fn list_products(&self) -> Result<Vec<ProductSummary>> {
        self.rows.list_summaries().await
    }

    /// Case-insensitive substring match on the product name.
    pub async fn search_products(&self, text: &str) -> Result<Vec<ProductSummary>> {
        let needle = text.to_lowercase();
        let mut products = self.rows.list_summaries().await?;
        products.retain(|p| p.name.to_lowercase().contains(&needle));
        Ok(products)
    }
}
