//! Projector folding product events into read-model rows.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{EventRecord, ProductEvent};
use event_store::{EventEnvelope, EventStore, Sequence};
use message_bus::{EventHandler, HandlerError};
use tokio::sync::Mutex;

use crate::Result;
use crate::read_model::{ProductDetail, ProductSummary, ReadStore};

type ProductRecord = EventRecord<ProductEvent>;

/// Last sequence per aggregate folded in by the latest rebuild.
type Watermarks = HashMap<AggregateId, Sequence>;

/// Keeps the product views in step with the event log.
///
/// Creation replaces both rows outright. Stock and price events overwrite
/// one column on rows that already exist and are ignored otherwise. Views
/// increment a counter, so projecting the same view twice counts it twice.
///
/// Projections and rebuilds take turns on one lock. A rebuild remembers how
/// far it read each aggregate's history, and a record delivered afterwards
/// at or below that point is skipped, so [`rebuild_all`](Self::rebuild_all)
/// yields exact counts even while the bus is still delivering.
#[derive(Clone)]
pub struct Projector<R: ReadStore> {
    rows: R,
    rebuilt: Arc<Mutex<Watermarks>>,
}

impl<R: ReadStore> Projector<R> {
    /// Creates a projector writing into `rows`.
    pub fn new(rows: R) -> Self {
        Self {
            rows,
            rebuilt: Arc::default(),
        }
    }

    /// Returns the row store this projector writes to.
    pub fn read_store(&self) -> &R {
        &self.rows
    }

    /// Applies one event to the views.
    ///
    /// Returns `false` when the event was already folded in by a rebuild.
    #[tracing::instrument(skip(self, record), fields(aggregate_id = %record.aggregate_id, sequence = %record.sequence))]
    pub async fn project(&self, record: &ProductRecord) -> Result<bool> {
        let rebuilt = self.rebuilt.lock().await;
        if rebuilt
            .get(&record.aggregate_id)
            .is_some_and(|last| record.sequence <= *last)
        {
            tracing::debug!("already projected by rebuild");
            return Ok(false);
        }

        self.apply(record).await?;
        Ok(true)
    }

    /// Decodes a stored envelope and projects it.
    pub async fn project_envelope(&self, envelope: &EventEnvelope) -> Result<bool> {
        let record = ProductRecord::decode(envelope)?;
        self.project(&record).await
    }

    /// Deletes every row and replays the whole log in append order.
    ///
    /// Returns the number of events projected. Running it twice on the same
    /// log leaves identical rows.
    #[tracing::instrument(skip(self, store))]
    pub async fn rebuild_all<S: EventStore>(&self, store: &S) -> Result<usize> {
        let mut rebuilt = self.rebuilt.lock().await;
        rebuilt.clear();
        self.rows.clear().await?;

        let events = store.load_all().await?;
        for envelope in &events {
            let record = ProductRecord::decode(envelope)?;
            self.apply(&record).await?;
            rebuilt
                .entry(record.aggregate_id)
                .and_modify(|last| *last = (*last).max(record.sequence))
                .or_insert(record.sequence);
        }

        tracing::info!(events = events.len(), "read model rebuilt");
        Ok(events.len())
    }

    async fn apply(&self, record: &ProductRecord) -> Result<()> {
        let id = record.aggregate_id;
        let at = record.occurred_at;

        match &record.event {
            ProductEvent::ProductCreated(data) => {
                self.rows
                    .upsert_detail(ProductDetail {
                        id,
                        name: data.name.clone(),
                        description: data.description.clone(),
                        price: data.price,
                        stock: data.stock,
                        view_count: 0,
                        supplier_name: data.supplier_name.clone(),
                        created_at: at,
                        updated_at: at,
                    })
                    .await?;
                self.rows
                    .upsert_summary(ProductSummary {
                        id,
                        name: data.name.clone(),
                        price: data.price,
                        stock: data.stock,
                        supplier_name: data.supplier_name.clone(),
                    })
                    .await?;
            }
            ProductEvent::StockUpdated(data) => {
                if let Some(mut detail) = self.rows.get_detail(id).await? {
                    detail.stock = data.new_stock;
                    detail.updated_at = at;
                    self.rows.upsert_detail(detail).await?;
                }
                if let Some(mut summary) = self.rows.get_summary(id).await? {
                    summary.stock = data.new_stock;
                    self.rows.upsert_summary(summary).await?;
                }
            }
            ProductEvent::PriceChanged(data) => {
                if let Some(mut detail) = self.rows.get_detail(id).await? {
                    detail.price = data.new_price;
                    detail.updated_at = at;
                    self.rows.upsert_detail(detail).await?;
                }
                if let Some(mut summary) = self.rows.get_summary(id).await? {
                    summary.price = data.new_price;
                    self.rows.upsert_summary(summary).await?;
                }
            }
            ProductEvent::ProductViewed(_) => {
                if let Some(mut detail) = self.rows.get_detail(id).await? {
                    detail.view_count += 1;
                    self.rows.upsert_detail(detail).await?;
                }
            }
        }

        metrics::counter!("projections_events_processed").increment(1);
        Ok(())
    }
}

#[async_trait]
impl<R: ReadStore> EventHandler<ProductRecord> for Projector<R> {
    fn name(&self) -> &str {
        "projector"
    }

    async fn handle(&self, record: &ProductRecord) -> std::result::Result<(), HandlerError> {
        self.project(record).await?;
        Ok(())
    }
}
