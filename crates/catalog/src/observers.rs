//! Side-effect subscribers: audit trail and low-stock alerts.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{EventRecord, ProductEvent, ProductEventKind};
use message_bus::{EventHandler, HandlerError};

type ProductRecord = EventRecord<ProductEvent>;

/// Entries each observer keeps unless told otherwise.
pub const DEFAULT_RETAINED: usize = 1_000;

/// Fixed-size history that drops its oldest entry when full.
#[derive(Debug)]
struct Recent<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
}

impl<T: Clone> Recent<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_RETAINED))),
        }
    }

    fn push(&self, item: T) {
        if self.capacity == 0 {
            return;
        }
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        if items.len() == self.capacity {
            items.pop_front();
        }
        items.push_back(item);
    }

    fn snapshot(&self) -> Vec<T> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub occurred_at: DateTime<Utc>,
    pub kind: ProductEventKind,
    pub product_id: AggregateId,
}

/// Logs every event it receives and keeps the most recent entries.
#[derive(Debug)]
pub struct AuditLogHandler {
    trail: Recent<AuditEntry>,
}

impl Default for AuditLogHandler {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETAINED)
    }
}

impl AuditLogHandler {
    /// Kinds the audit log subscribes to.
    pub const KINDS: [ProductEventKind; 3] = [
        ProductEventKind::ProductCreated,
        ProductEventKind::StockUpdated,
        ProductEventKind::PriceChanged,
    ];

    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            trail: Recent::new(capacity),
        }
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.trail.snapshot()
    }
}

#[async_trait]
impl EventHandler<ProductRecord> for AuditLogHandler {
    fn name(&self) -> &str {
        "audit_log"
    }

    async fn handle(&self, record: &ProductRecord) -> Result<(), HandlerError> {
        let entry = AuditEntry {
            occurred_at: record.occurred_at,
            kind: record.kind(),
            product_id: record.aggregate_id,
        };

        tracing::info!(
            target: "audit",
            occurred_at = %entry.occurred_at.to_rfc3339(),
            kind = %entry.kind,
            product_id = %entry.product_id,
            "audit"
        );

        self.trail.push(entry);
        Ok(())
    }
}

/// A stock update that fell below the alert threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowStockAlert {
    pub product_id: AggregateId,
    pub stock: i64,
}

/// Raises an alert when a stock update drops below a threshold.
///
/// Only the most recent alerts are retained.
#[derive(Debug)]
pub struct LowStockAlertHandler {
    threshold: i64,
    alerts: Recent<LowStockAlert>,
}

impl LowStockAlertHandler {
    pub fn new(threshold: i64) -> Self {
        Self::with_capacity(threshold, DEFAULT_RETAINED)
    }

    /// Keeps at most `capacity` alerts.
    pub fn with_capacity(threshold: i64, capacity: usize) -> Self {
        Self {
            threshold,
            alerts: Recent::new(capacity),
        }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Retained alerts, oldest first.
    pub fn alerts(&self) -> Vec<LowStockAlert> {
        self.alerts.snapshot()
    }
}

#[async_trait]
impl EventHandler<ProductRecord> for LowStockAlertHandler {
    fn name(&self) -> &str {
        "low_stock_alert"
    }

    async fn handle(&self, record: &ProductRecord) -> Result<(), HandlerError> {
        let ProductEvent::StockUpdated(data) = &record.event else {
            return Ok(());
        };
        if data.new_stock >= self.threshold {
            return Ok(());
        }

        tracing::warn!(
            product_id = %data.product_id,
            stock = data.new_stock,
            threshold = self.threshold,
            "low stock"
        );
        metrics::counter!("catalog_low_stock_alerts").increment(1);

        self.alerts.push(LowStockAlert {
            product_id: data.product_id,
            stock: data.new_stock,
        });
        Ok(())
    }
}
