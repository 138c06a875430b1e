//! Metrics collection for observability
//!
//! Each account owns its own registry so many accounts can live in one
//! process. Cloning a collector shares its counters: a cloned account keeps
//! reporting into the registry of the account it was cloned from.
//!
//! # Metrics
//!
//! - `fx_transactions_settled_total` - Transactions applied in full immediately
//! - `fx_transactions_queued_total` - Transactions with at least one scheduled leg
//! - `fx_transactions_ignored_total` - Uncovered `ignore` transactions
//! - `fx_transactions_rejected_total` - Transactions refused for lack of coverage
//! - `fx_queue_entries_drained_total` - Queue entries applied by `tick`
//! - `fx_queue_depth` - Entries currently pending

use crate::account::Confirmation;
use prometheus::{IntCounter, IntGauge, Registry};
use std::fmt;
use std::sync::Arc;

/// Metrics collector; clones share one registry
#[derive(Clone)]
pub struct Metrics {
    settled_total: IntCounter,
    queued_total: IntCounter,
    ignored_total: IntCounter,
    rejected_total: IntCounter,
    drained_total: IntCounter,
    queue_depth: IntGauge,
    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let settled_total = IntCounter::new(
            "fx_transactions_settled_total",
            "Transactions applied in full immediately",
        )?;
        registry.register(Box::new(settled_total.clone()))?;

        let queued_total = IntCounter::new(
            "fx_transactions_queued_total",
            "Transactions with at least one scheduled leg",
        )?;
        registry.register(Box::new(queued_total.clone()))?;

        let ignored_total = IntCounter::new(
            "fx_transactions_ignored_total",
            "Uncovered transactions dropped in ignore mode",
        )?;
        registry.register(Box::new(ignored_total.clone()))?;

        let rejected_total = IntCounter::new(
            "fx_transactions_rejected_total",
            "Transactions refused for lack of coverage",
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let drained_total = IntCounter::new(
            "fx_queue_entries_drained_total",
            "Queue entries applied by tick",
        )?;
        registry.register(Box::new(drained_total.clone()))?;

        let queue_depth = IntGauge::new("fx_queue_depth", "Entries currently pending")?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            settled_total,
            queued_total,
            ignored_total,
            rejected_total,
            drained_total,
            queue_depth,
            registry,
        })
    }

    /// Record a transaction outcome
    pub fn record_confirmation(&self, confirmation: Confirmation) {
        match confirmation {
            Confirmation::Settled => self.settled_total.inc(),
            Confirmation::Queued => self.queued_total.inc(),
            Confirmation::Ignored => self.ignored_total.inc(),
        }
    }

    /// Record a coverage rejection
    pub fn record_rejection(&self) {
        self.rejected_total.inc();
    }

    /// Record entries applied by a drain
    pub fn record_drain(&self, applied: usize) {
        self.drained_total.inc_by(applied as u64);
    }

    /// Update pending queue depth
    pub fn update_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Transactions applied in full
    pub fn settled(&self) -> u64 {
        self.settled_total.get()
    }

    /// Transactions with scheduled legs
    pub fn queued(&self) -> u64 {
        self.queued_total.get()
    }

    /// Ignored transactions
    pub fn ignored(&self) -> u64 {
        self.ignored_total.get()
    }

    /// Transactions refused for lack of coverage
    pub fn rejected(&self) -> u64 {
        self.rejected_total.get()
    }

    /// Queue entries applied by ticks
    pub fn drained(&self) -> u64 {
        self.drained_total.get()
    }

    /// Pending queue entries at the last update
    pub fn queue_depth(&self) -> i64 {
        self.queue_depth.get()
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("settled_total", &self.settled_total.get())
            .field("queued_total", &self.queued_total.get())
            .field("ignored_total", &self.ignored_total.get())
            .field("rejected_total", &self.rejected_total.get())
            .field("drained_total", &self.drained_total.get())
            .field("queue_depth", &self.queue_depth.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.settled(), 0);
        assert_eq!(metrics.registry().gather().len(), 6);
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_confirmation(Confirmation::Queued);
        a.record_drain(3);
        a.update_queue_depth(2);

        assert_eq!(a.queued(), 1);
        assert_eq!(a.drained(), 3);
        assert_eq!(a.queue_depth(), 2);
        assert_eq!(b.queued(), 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let a = Metrics::new().unwrap();
        let b = a.clone();
        b.record_rejection();
        b.update_queue_depth(4);

        assert_eq!(a.rejected(), 1);
        assert_eq!(a.queue_depth(), 4);
        assert!(std::ptr::eq(a.registry(), b.registry()));
    }
}
