//! Catalog demo entry point.
//!
//! Runs a short scripted session against the configured event store and
//! shows the read side catching up with the write side.

use catalog::telemetry::{init_tracing, install_metrics};
use catalog::{Catalog, CatalogError, Config, open_store};
use domain::{ChangePrice, CreateProduct, RecordProductView, UpdateStock};
use projections::ProductQuery;

#[tokio::main]
async fn main() -> Result<(), CatalogError> {
    // 1. Configuration and telemetry
    let config = Config::from_env();
    init_tracing(&config)?;
    let metrics_handle = install_metrics()?;

    // 2. Store, bus and subscribers
    let store = open_store(&config).await?;
    let app = Catalog::new(store, &config);
    app.start().await?;

    // 3. Create products
    tracing::info!("creating products");
    let widget = app
        .commands
        .create_product(CreateProduct::new("Widget Pro", 29.99, 12.00, 1, "Acme Corp", 100))
        .await?;
    let gadget = app
        .commands
        .create_product(CreateProduct::new("Gadget Plus", 49.99, 22.50, 1, "Acme Corp", 15))
        .await?;

    // 4. The read side may lag until the bus is flushed
    let before = app.queries.handle(ProductQuery::GetProductDetail(widget)).await?;
    tracing::info!(detail = ?before, "widget detail before flush");

    app.flush().await?;
    let after = app.queries.handle(ProductQuery::GetProductDetail(widget)).await?;
    tracing::info!(detail = ?after, "widget detail after flush");

    // 5. One stock update fans out to projector, audit log and alert
    app.commands.update_stock(UpdateStock::new(gadget, 8)).await?;
    app.flush().await?;

    app.commands.change_price(ChangePrice::new(gadget, 44.99)).await?;
    app.flush().await?;

    app.commands.record_view(RecordProductView::new(widget)).await?;
    app.commands.record_view(RecordProductView::new(widget)).await?;
    app.flush().await?;

    // 6. Final state
    for product in app.queries.list_products().await? {
        match serde_json::to_string(&product) {
            Ok(line) => tracing::info!(product = %line, "product"),
            Err(error) => tracing::warn!(%error, "could not render product"),
        }
    }
    tracing::info!(
        audit_entries = app.audit.entries().len(),
        low_stock_alerts = app.low_stock.alerts().len(),
        "observers"
    );

    app.shutdown().await?;
    tracing::info!(metrics = %metrics_handle.render(), "final metrics");
    Ok(())
}
