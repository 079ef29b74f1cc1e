//! Command handling infrastructure.

use std::marker::PhantomData;
use std::sync::Arc;

use common::AggregateId;
use event_store::{AppendOptions, EventStore, Version};

use crate::aggregate::{Aggregate, DomainEvent, EventRecord, reconstruct};
use crate::clock::{Clock, SystemClock};
use crate::error::DomainError;

/// How appends guard against a writer that raced in after the load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// Each append expects the version the command was validated against.
    /// A concurrent writer makes the command fail with a concurrency conflict.
    #[default]
    Optimistic,

    /// Appends carry no version check. Both racing commands succeed and the
    /// event recorded last wins on replay.
    LastWriterWins,
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were appended, with their store positions.
    pub records: Vec<EventRecord<A::Event>>,

    /// The version of the aggregate after the command.
    pub new_version: Version,
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Loading the aggregate history and replaying it
/// 2. Running the command's validation to produce events
/// 3. Stamping the events with the clock and appending them
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    clock: Arc<dyn Clock>,
    mode: ConcurrencyMode,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a new command handler using the system clock and optimistic appends.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            mode: ConcurrencyMode::default(),
            _phantom: PhantomData,
        }
    }

    /// Replaces the clock used to stamp new events.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the concurrency mode.
    pub fn with_mode(mut self, mode: ConcurrencyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// Loads an aggregate from the event store.
    ///
    /// If the aggregate has no events, returns a default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let events = self.store.load(aggregate_id).await?;
        reconstruct(&events)
    }

    /// Loads an aggregate, returning None if it has no events.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.version() > Version::initial() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Loads the aggregate as it was after its first `version` events.
    ///
    /// Returns None if the aggregate has no events. A version past the end
    /// of the history gives the current state.
    pub async fn load_at_version(
        &self,
        aggregate_id: AggregateId,
        version: Version,
    ) -> Result<Option<A>, DomainError> {
        let events = self.store.load(aggregate_id).await?;
        if events.is_empty() {
            return Ok(None);
        }

        let len = usize::try_from(version.as_i64())
            .unwrap_or(0)
            .min(events.len());
        Ok(Some(reconstruct(&events[..len])?))
    }

    /// Returns the decoded history of an aggregate.
    pub async fn history(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventRecord<A::Event>>, DomainError> {
        self.store
            .load(aggregate_id)
            .await?
            .iter()
            .map(EventRecord::decode)
            .collect()
    }

    /// Creates a new aggregate.
    ///
    /// Allocates an identifier, then passes it to `command_fn` to produce
    /// the creation events. The identifier is consumed even if the command
    /// is rejected.
    pub async fn create<F>(&self, command_fn: F) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(AggregateId) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate_id = self.store.allocate_id().await?;
        let events = command_fn(aggregate_id)?;
        self.persist(aggregate_id, A::default(), events).await
    }

    /// Executes a command against an existing aggregate and persists the
    /// resulting events.
    ///
    /// Fails with `NotFound` when the aggregate has no events. The command
    /// function receives the replayed state and returns either the events
    /// to append or a validation error.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self
            .load_existing(aggregate_id)
            .await?
            .ok_or(DomainError::NotFound(aggregate_id))?;

        let events = command_fn(&aggregate)?;
        self.persist(aggregate_id, aggregate, events).await
    }

    async fn persist(
        &self,
        aggregate_id: AggregateId,
        mut aggregate: A,
        events: Vec<A::Event>,
    ) -> Result<CommandResult<A>, DomainError> {
        let mut records = Vec::with_capacity(events.len());

        for event in events {
            let new_event = event.to_new_event(aggregate_id, self.clock.now())?;

            let options = match self.mode {
                ConcurrencyMode::Optimistic => AppendOptions::expect_version(aggregate.version()),
                ConcurrencyMode::LastWriterWins => AppendOptions::new(),
            };

            let envelope = self.store.append(new_event, options).await?;

            aggregate.replay(event.clone());
            records.push(EventRecord {
                aggregate_id,
                sequence: envelope.sequence,
                occurred_at: envelope.occurred_at,
                event,
            });
        }

        let new_version = aggregate.version();
        Ok(CommandResult {
            aggregate,
            records,
            new_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use event_store::{
        EventEnvelope, EventStoreExt, InMemoryEventStore, NewEvent, Result as StoreResult,
        Sequence,
    };

    use super::*;
    use crate::clock::FixedClock;
    use crate::product::{CreateProduct, Product, ProductError, ProductEvent};

    fn widget() -> CreateProduct {
        CreateProduct::new("Widget Pro", 29.99, 12.0, 1, "Acme Corp", 100)
    }

    async fn create_widget<S: EventStore>(handler: &CommandHandler<S, Product>) -> AggregateId {
        let cmd = widget();
        handler
            .create(|id| Product::create(id, &cmd))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap()
    }

    /// Appends an event from another writer right after every load.
    struct InterleavingStore {
        inner: InMemoryEventStore,
        intruder: Mutex<Option<ProductEvent>>,
    }

    #[async_trait]
    impl EventStore for InterleavingStore {
        async fn allocate_id(&self) -> StoreResult<AggregateId> {
            self.inner.allocate_id().await
        }

        async fn append(&self, event: NewEvent, options: AppendOptions) -> StoreResult<EventEnvelope> {
            self.inner.append(event, options).await
        }

        async fn load(&self, aggregate_id: AggregateId) -> StoreResult<Vec<EventEnvelope>> {
            let events = self.inner.load(aggregate_id).await?;
            let intruder = self.intruder.lock().unwrap().take();
            if let Some(event) = intruder {
                let new_event = event.to_new_event(aggregate_id, Utc::now())?;
                self.inner.append_unchecked(new_event).await?;
            }
            Ok(events)
        }

        async fn load_all(&self) -> StoreResult<Vec<EventEnvelope>> {
            self.inner.load_all().await
        }

        async fn aggregate_version(&self, aggregate_id: AggregateId) -> StoreResult<Version> {
            self.inner.aggregate_version(aggregate_id).await
        }
    }

    #[tokio::test]
    async fn create_allocates_id_and_appends_at_sequence_zero() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Product> = CommandHandler::new(store.clone());
        let cmd = widget();

        let result = handler.create(|id| Product::create(id, &cmd)).await.unwrap();

        assert_eq!(result.new_version, Version::new(1));
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].sequence, Sequence::first());
        assert_eq!(result.aggregate.stock(), 100);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn events_are_stamped_by_the_clock() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Product> =
            CommandHandler::new(store.clone()).with_clock(Arc::new(FixedClock(instant)));

        let id = create_widget(&handler).await;

        let stored = store.load(id).await.unwrap();
        assert_eq!(stored[0].occurred_at, instant);
    }

    #[tokio::test]
    async fn execute_on_missing_aggregate_is_not_found() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Product> = CommandHandler::new(store.clone());
        let allocated = store.allocate_id().await.unwrap();

        for id in [allocated, AggregateId::new(999)] {
            let result = handler.execute(id, |p| p.update_stock(5)).await;
            assert!(matches!(result, Err(DomainError::NotFound(missing)) if missing == id));
        }
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn rejected_command_appends_nothing() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Product> = CommandHandler::new(store.clone());
        let id = create_widget(&handler).await;

        let result = handler.execute(id, |p| p.update_stock(-1)).await;

        assert!(matches!(
            result,
            Err(DomainError::InvalidCommand(ProductError::NegativeStock { stock: -1 }))
        ));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn execute_appends_after_existing_history() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Product> = CommandHandler::new(store);
        let id = create_widget(&handler).await;

        let result = handler.execute(id, |p| p.update_stock(5)).await.unwrap();

        assert_eq!(result.records[0].sequence, Sequence::new(1));
        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.aggregate.stock(), 5);
    }

    #[tokio::test]
    async fn load_at_version_travels_back() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Product> = CommandHandler::new(store);
        let id = create_widget(&handler).await;
        handler.execute(id, |p| p.update_stock(50)).await.unwrap();
        handler.execute(id, |p| p.change_price(19.99)).await.unwrap();

        let v1 = handler.load_at_version(id, Version::new(1)).await.unwrap().unwrap();
        assert_eq!((v1.stock(), v1.price()), (100, 29.99));

        let v2 = handler.load_at_version(id, Version::new(2)).await.unwrap().unwrap();
        assert_eq!((v2.stock(), v2.price()), (50, 29.99));

        let latest = handler.load_at_version(id, Version::new(10)).await.unwrap().unwrap();
        assert_eq!(latest.version(), Version::new(3));

        assert!(handler
            .load_at_version(AggregateId::new(404), Version::new(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn history_decodes_every_event() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Product> = CommandHandler::new(store);
        let id = create_widget(&handler).await;
        handler.execute(id, |p| p.record_view()).await.unwrap();

        let history = handler.history(id).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].event, ProductEvent::viewed(id));
    }

    #[tokio::test]
    async fn optimistic_mode_rejects_a_racing_writer() {
        let setup: CommandHandler<_, Product> = CommandHandler::new(InMemoryEventStore::new());
        let id = create_widget(&setup).await;

        let store = InterleavingStore {
            inner: setup.store().clone(),
            intruder: Mutex::new(Some(ProductEvent::stock_updated(id, 1))),
        };
        let handler: CommandHandler<_, Product> = CommandHandler::new(store);

        let result = handler.execute(id, |p| p.update_stock(70)).await;

        let error = result.unwrap_err();
        assert!(error.is_concurrency_conflict());
        let stock = setup.load(id).await.unwrap().stock();
        assert_eq!(stock, 1);
    }

    #[tokio::test]
    async fn last_writer_wins_mode_keeps_both_writes() {
        let setup: CommandHandler<_, Product> = CommandHandler::new(InMemoryEventStore::new());
        let id = create_widget(&setup).await;

        let store = InterleavingStore {
            inner: setup.store().clone(),
            intruder: Mutex::new(Some(ProductEvent::stock_updated(id, 1))),
        };
        let handler: CommandHandler<_, Product> =
            CommandHandler::new(store).with_mode(ConcurrencyMode::LastWriterWins);

        let result = handler.execute(id, |p| p.update_stock(70)).await.unwrap();

        assert_eq!(result.records[0].sequence, Sequence::new(2));
        let product = setup.load(id).await.unwrap();
        assert_eq!(product.stock(), 70);
        assert_eq!(product.version(), Version::new(3));
    }
}
