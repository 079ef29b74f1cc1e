//! Event-sourced product catalog.
//!
//! Wires the event store, the product command handler, the message bus, the
//! projector and the observers into one application. Commands are recorded
//! in the store and published on the bus; the projector and observers react
//! asynchronously and queries read the projected rows.

pub mod config;
pub mod error;
pub mod observers;
pub mod telemetry;

use std::sync::Arc;

use domain::{ProductBus, ProductCommandHandler, ProductEventKind};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use projections::{InMemoryReadStore, Projector, QueryHandler};

pub use config::{Config, LogFormat};
pub use error::CatalogError;
pub use observers::{AuditEntry, AuditLogHandler, LowStockAlert, LowStockAlertHandler};

/// Event store selected from configuration.
pub type SharedStore = Arc<dyn EventStore>;

/// Opens the configured event store.
///
/// Connects to PostgreSQL and runs migrations when `DATABASE_URL` is set,
/// otherwise starts with an empty in-memory store.
pub async fn open_store(config: &Config) -> Result<SharedStore, CatalogError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresEventStore::connect(url).await?;
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL event store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("using in-memory event store");
            Ok(Arc::new(InMemoryEventStore::new()))
        }
    }
}

/// The assembled application.
pub struct Catalog<S: EventStore + Clone> {
    pub commands: ProductCommandHandler<S>,
    pub queries: QueryHandler<InMemoryReadStore>,
    pub projector: Projector<InMemoryReadStore>,
    pub bus: ProductBus,
    pub audit: Arc<AuditLogHandler>,
    pub low_stock: Arc<LowStockAlertHandler>,
    store: S,
}

impl<S: EventStore + Clone> Catalog<S> {
    /// Builds the application and subscribes every handler.
    ///
    /// The bus is left idle; call [`start`](Self::start) to begin delivery.
    pub fn new(store: S, config: &Config) -> Self {
        let rows = InMemoryReadStore::new();
        let bus = ProductBus::new();

        let projector = Projector::new(rows.clone());
        let audit = Arc::new(AuditLogHandler::new());
        let low_stock = Arc::new(LowStockAlertHandler::new(config.low_stock_threshold));

        bus.subscribe_all(ProductEventKind::ALL, Arc::new(projector.clone()));
        bus.subscribe_all(AuditLogHandler::KINDS, Arc::clone(&audit));
        bus.subscribe(ProductEventKind::StockUpdated, Arc::clone(&low_stock));

        Self {
            commands: ProductCommandHandler::new(store.clone()).with_bus(bus.clone()),
            queries: QueryHandler::new(rows),
            projector,
            bus,
            audit,
            low_stock,
            store,
        }
    }

    /// Returns the event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds the read model from the log, then starts the bus.
    ///
    /// Rebuilding first means a persistent store's history is visible to
    /// queries before any new command runs.
    pub async fn start(&self) -> Result<(), CatalogError> {
        let replayed = self.projector.rebuild_all(&self.store).await?;
        self.bus.start()?;
        tracing::info!(replayed, "catalog started");
        Ok(())
    }

    /// Waits until every published event has been projected.
    pub async fn flush(&self) -> Result<(), CatalogError> {
        self.bus.flush().await?;
        Ok(())
    }

    /// Drains the bus and stops delivery.
    pub async fn shutdown(&self) -> Result<(), CatalogError> {
        self.bus.stop().await?;
        tracing::info!(stats = ?self.bus.stats(), "catalog stopped");
        Ok(())
    }
}
