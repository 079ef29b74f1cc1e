//! Logging and metrics setup for the binary.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::CatalogError;

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &Config) -> Result<(), CatalogError> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (pretty, json) = match config.log_format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()
        .map_err(|e| CatalogError::Telemetry(e.to_string()))
}

/// Installs the Prometheus metrics recorder.
pub fn install_metrics() -> Result<PrometheusHandle, CatalogError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| CatalogError::Telemetry(e.to_string()))
}
