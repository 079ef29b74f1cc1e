use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, NewEvent, Result, Sequence, Version,
    store::{AppendOptions, EventStore},
};

const SELECT_EVENTS: &str =
    "SELECT id, aggregate_id, sequence, event_type, occurred_at, payload FROM events";

/// PostgreSQL-backed event store implementation.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url` and creates a store on the pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            aggregate_id: AggregateId::new(row.try_get("aggregate_id")?),
            sequence: Sequence::new(row.try_get("sequence")?),
            event_type: row.try_get("event_type")?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn allocate_id(&self) -> Result<AggregateId> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO aggregate_registry DEFAULT VALUES RETURNING id")
                .fetch_one(&self.pool)
                .await?;
        Ok(AggregateId::new(id))
    }

    #[tracing::instrument(skip(self, event), fields(aggregate_id = %event.aggregate_id, event_type = %event.event_type))]
    async fn append(&self, event: NewEvent, options: AppendOptions) -> Result<EventEnvelope> {
        let aggregate_id = event.aggregate_id;

        let mut tx = self.pool.begin().await?;

        // Serializes appends per aggregate until the transaction ends.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(aggregate_id.as_i64())
            .execute(&mut *tx)
            .await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE aggregate_id = $1")
            .bind(aggregate_id.as_i64())
            .fetch_one(&mut *tx)
            .await?;
        let current_version = Version::new(count);

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

        sqlx::query(
            r#"
            INSERT INTO events (id, aggregate_id, sequence, event_type, occurred_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(envelope.event_id.as_uuid())
        .bind(envelope.aggregate_id.as_i64())
        .bind(envelope.sequence.as_i64())
        .bind(&envelope.event_type)
        .bind(envelope.occurred_at)
        .bind(&envelope.payload)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_aggregate_sequence")
            {
                return EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: options.expected_version.unwrap_or(current_version),
                    actual: current_version.next(),
                };
            }
            EventStoreError::Database(e)
        })?;

        tx.commit().await?;

        metrics::counter!("event_store_events_appended").increment(1);
        tracing::debug!(sequence = %envelope.sequence, "event appended");

        Ok(envelope)
    }

    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!(
            "{SELECT_EVENTS} WHERE aggregate_id = $1 ORDER BY sequence ASC"
        ))
        .bind(aggregate_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn load_all(&self) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!("{SELECT_EVENTS} ORDER BY position ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE aggregate_id = $1")
            .bind(aggregate_id.as_i64())
            .fetch_one(&self.pool)
            .await?;

        Ok(Version::new(count))
    }
}
