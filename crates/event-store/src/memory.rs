use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, NewEvent, Result, Version,
    store::{AppendOptions, EventStore},
};

#[derive(Default)]
struct Log {
    /// Every recorded event in global append order.
    events: Vec<EventEnvelope>,
    /// Number of events recorded per aggregate.
    versions: HashMap<AggregateId, Version>,
    /// Last allocated aggregate ID.
    last_id: i64,
}

/// In-memory event store implementation for tests and local runs.
///
/// Provides the same interface and ordering guarantees as the PostgreSQL
/// implementation. The whole log sits behind a single lock, so an append
/// is visible to loads only once it is complete.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn allocate_id(&self) -> Result<AggregateId> {
        let mut log = self.log.write().await;
        log.last_id += 1;
        Ok(AggregateId::new(log.last_id))
    }

    #[tracing::instrument(skip(self, event), fields(aggregate_id = %event.aggregate_id, event_type = %event.event_type))]
    async fn append(&self, event: NewEvent, options: AppendOptions) -> Result<EventEnvelope> {
        let aggregate_id = event.aggregate_id;
        let mut log = self.log.write().await;

        let current_version = log.versions.get(&aggregate_id).copied().unwrap_or_default();

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current_version,
            });
        }

        let envelope = EventEnvelope::record(event, current_version.next_sequence());
        log.versions.insert(aggregate_id, current_version.next());
        log.events.push(envelope.clone());

        metrics::counter!("event_store_events_appended").increment(1);
        tracing::debug!(sequence = %envelope.sequence, "event appended");

        Ok(envelope)
    }

    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn load_all(&self) -> Result<Vec<EventEnvelope>> {
        Ok(self.log.read().await.events.clone())
    }

    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        let log = self.log.read().await;
        Ok(log.versions.get(&aggregate_id).copied().unwrap_or_default())
    }
}
