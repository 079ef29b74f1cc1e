//! Read-model rows and the store that holds them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;

/// Full product row for the detail page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDetail {
    pub id: AggregateId,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub view_count: u64,
    pub supplier_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product row used by lists and search results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub id: AggregateId,
    pub name: String,
    pub price: f64,
    pub stock: i64,
    pub supplier_name: String,
}

/// Public product card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductCard {
    pub id: AggregateId,
    pub name: String,
    pub price: f64,
    pub in_stock: bool,
}

impl From<&ProductSummary> for ProductCard {
    fn from(summary: &ProductSummary) -> Self {
        Self {
            id: summary.id,
            name: summary.name.clone(),
            price: summary.price,
            in_stock: summary.stock > 0,
        }
    }
}

/// Keyed row storage for the two product views.
///
/// Rows are derived data: the projector is their only writer and can
/// recreate all of them from the event log.
#[async_trait]
pub trait ReadStore: Send + Sync {
    /// Inserts or replaces the detail row with the same id.
    async fn upsert_detail(&self, detail: ProductDetail) -> Result<()>;

    /// Inserts or replaces the summary row with the same id.
    async fn upsert_summary(&self, summary: ProductSummary) -> Result<()>;

    async fn get_detail(&self, id: AggregateId) -> Result<Option<ProductDetail>>;

    async fn get_summary(&self, id: AggregateId) -> Result<Option<ProductSummary>>;

    /// Every summary row ordered by id.
    async fn list_summaries(&self) -> Result<Vec<ProductSummary>>;

    /// Deletes every row of both views.
    async fn clear(&self) -> Result<()>;
}

#[derive(Default)]
struct Tables {
    details: BTreeMap<AggregateId, ProductDetail>,
    summaries: BTreeMap<AggregateId, ProductSummary>,
}

/// In-memory read store.
///
/// Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryReadStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryReadStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of detail rows.
    pub async fn count(&self) -> usize {
        self.tables.read().await.details.len()
    }
}

#[async_trait]
impl ReadStore for InMemoryReadStore {
    async fn upsert_detail(&self, detail: ProductDetail) -> Result<()> {
        self.tables.write().await.details.insert(detail.id, detail);
        Ok(())
    }

    async fn upsert_summary(&self, summary: ProductSummary) -> Result<()> {
        self.tables
            .write()
            .await
            .summaries
            .insert(summary.id, summary);
        Ok(())
    }

    async fn get_detail(&self, id: AggregateId) -> Result<Option<ProductDetail>> {
        Ok(self.tables.read().await.details.get(&id).cloned())
    }

    async fn get_summary(&self, id: AggregateId) -> Result<Option<ProductSummary>> {
        Ok(self.tables.read().await.summaries.get(&id).cloned())
    }

    async fn list_summaries(&self) -> Result<Vec<ProductSummary>> {
        Ok(self.tables.read().await.summaries.values().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.details.clear();
        tables.summaries.clear();
        Ok(())
    }
}
