use std::sync::Arc;

use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, NewEvent, Result, Version};

/// Options for appending an event to the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOptions {
    /// Expected version of the aggregate for optimistic concurrency control.
    /// If None, no version check is performed and the event is recorded
    /// after whatever the aggregate currently holds.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the aggregate to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the aggregate to have no events yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Core trait for event store implementations.
///
/// An event store is a durable, append-only log of events grouped by
/// aggregate. It never rewrites or deletes a recorded event.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Reserves a new aggregate identifier.
    ///
    /// Identifiers are allocated monotonically and never reused. No event
    /// needs to exist for an identifier after allocation.
    async fn allocate_id(&self) -> Result<AggregateId>;

    /// Appends an event to its aggregate's stream.
    ///
    /// The store assigns the next sequence number for the aggregate. The
    /// append is atomic: the event is either fully recorded and visible to
    /// subsequent loads, or not recorded at all. If
    /// `options.expected_version` is set, the append fails with
    /// `ConcurrencyConflict` when the aggregate holds a different number
    /// of events.
    async fn append(&self, event: NewEvent, options: AppendOptions) -> Result<EventEnvelope>;

    /// Retrieves all events for an aggregate in append order.
    ///
    /// Returns an empty list for an aggregate with no events, whether or
    /// not its identifier was ever allocated.
    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Retrieves every event in global append order.
    async fn load_all(&self) -> Result<Vec<EventEnvelope>>;

    /// Returns the number of events recorded for an aggregate.
    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Version>;
}

#[async_trait]
impl<S: EventStore + ?Sized> EventStore for Arc<S> {
    async fn allocate_id(&self) -> Result<AggregateId> {
        (**self).allocate_id().await
    }

    async fn append(&self, event: NewEvent, options: AppendOptions) -> Result<EventEnvelope> {
        (**self).append(event, options).await
    }

    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        (**self).load(aggregate_id).await
    }

    async fn load_all(&self) -> Result<Vec<EventEnvelope>> {
        (**self).load_all().await
    }

    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        (**self).aggregate_version(aggregate_id).await
    }
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends an event without a version check.
    async fn append_unchecked(&self, event: NewEvent) -> Result<EventEnvelope> {
        self.append(event, AppendOptions::new()).await
    }

    /// Checks if an aggregate has any recorded events.
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.aggregate_version(aggregate_id).await? > Version::initial())
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}
