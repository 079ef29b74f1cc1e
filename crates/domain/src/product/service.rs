//! Product command handler: validation, persistence and publication.

use std::sync::Arc;

use common::AggregateId;
use event_store::{EventStore, Version};
use message_bus::MessageBus;

use crate::aggregate::{Aggregate, EventRecord};
use crate::clock::Clock;
use crate::command::{CommandHandler, CommandResult, ConcurrencyMode};
use crate::error::DomainError;

use super::{
    ChangePrice, CreateProduct, Product, ProductCommand, ProductEvent, RecordProductView,
    UpdateStock,
};

/// The bus product events are published on.
pub type ProductBus = MessageBus<EventRecord<ProductEvent>>;

/// Handles product commands.
///
/// Every accepted command appends exactly one event. When a bus is
/// attached, the event is published only after the append succeeded, so
/// subscribers never see an event the store does not hold.
pub struct ProductCommandHandler<S: EventStore> {
    handler: CommandHandler<S, Product>,
    bus: Option<ProductBus>,
}

impl<S: EventStore> ProductCommandHandler<S> {
    /// Creates a handler that only records events.
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
            bus: None,
        }
    }

    /// Publishes appended events on `bus`.
    pub fn with_bus(mut self, bus: ProductBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.handler = self.handler.with_clock(clock);
        self
    }

    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.handler = self.handler.with_mode(mode);
        self
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Product> {
        &self.handler
    }

    /// Dispatches a command.
    ///
    /// Creation returns the new product's identifier; every other command
    /// returns None.
    #[tracing::instrument(skip(self, command), fields(command = command.name()))]
    pub async fn handle(&self, command: ProductCommand) -> Result<Option<AggregateId>, DomainError> {
        let name = command.name();

        let outcome = match command {
            ProductCommand::CreateProduct(cmd) => self.create_product(cmd).await.map(Some),
            ProductCommand::UpdateStock(cmd) => self.update_stock(cmd).await.map(|()| None),
            ProductCommand::ChangePrice(cmd) => self.change_price(cmd).await.map(|()| None),
            ProductCommand::RecordProductView(cmd) => self.record_view(cmd).await.map(|()| None),
        };

        match &outcome {
            Ok(_) => metrics::counter!("commands_handled", "command" => name).increment(1),
            Err(error) => {
                metrics::counter!("commands_rejected", "command" => name).increment(1);
                tracing::warn!(command = name, %error, "command rejected");
            }
        }

        outcome
    }

    /// Adds a product to the catalog and returns its identifier.
    pub async fn create_product(&self, cmd: CreateProduct) -> Result<AggregateId, DomainError> {
        cmd.validate()?;

        let result = self
            .handler
            .create(|product_id| Product::create(product_id, &cmd))
            .await?;

        let product_id = result.aggregate.id().ok_or(super::ProductError::NotCreated)?;
        tracing::info!(%product_id, name = %cmd.name, "product created");

        self.publish(result);
        Ok(product_id)
    }

    pub async fn update_stock(&self, cmd: UpdateStock) -> Result<(), DomainError> {
        let result = self
            .handler
            .execute(cmd.product_id, |product| product.update_stock(cmd.new_stock))
            .await?;
        self.publish(result);
        Ok(())
    }

    pub async fn change_price(&self, cmd: ChangePrice) -> Result<(), DomainError> {
        let result = self
            .handler
            .execute(cmd.product_id, |product| product.change_price(cmd.new_price))
            .await?;
        self.publish(result);
        Ok(())
    }

    pub async fn record_view(&self, cmd: RecordProductView) -> Result<(), DomainError> {
        let result = self
            .handler
            .execute(cmd.product_id, |product| product.record_view())
            .await?;
        self.publish(result);
        Ok(())
    }

    /// Loads a product by ID.
    ///
    /// Returns None if the product doesn't exist.
    pub async fn get_product(&self, product_id: AggregateId) -> Result<Option<Product>, DomainError> {
        self.handler.load_existing(product_id).await
    }

    /// Loads a product as it was after its first `version` events.
    pub async fn get_product_at(
        &self,
        product_id: AggregateId,
        version: Version,
    ) -> Result<Option<Product>, DomainError> {
        self.handler.load_at_version(product_id, version).await
    }

    /// Returns every event recorded for a product.
    pub async fn product_history(
        &self,
        product_id: AggregateId,
    ) -> Result<Vec<EventRecord<ProductEvent>>, DomainError> {
        self.handler.history(product_id).await
    }

    fn publish(&self, result: CommandResult<Product>) {
        let Some(bus) = &self.bus else {
            return;
        };
        for record in result.records {
            bus.publish(record);
        }
    }
}
