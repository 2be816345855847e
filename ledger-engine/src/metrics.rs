//! Prometheus metrics for the engine
//!
//! # Metrics
//!
//! - `engine_operations_total{op, status}` - Operations processed
//! - `engine_operation_duration_seconds{op}` - Operation latencies
//! - `engine_events_published_total` - Events published to the bus
//! - `engine_pools_funded_total` - Pools that reached full funding
//! - `engine_funds_moved_total{flow}` - Cents moved, by flow direction

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Each instance carries its own registry so that independent engines (and
/// tests) never collide on metric names.
#[derive(Clone)]
pub struct Metrics {
    /// Operations processed, by operation and outcome
    pub operations_total: IntCounterVec,

    /// Operation latency histogram
    pub operation_duration: HistogramVec,

    /// Events published to the bus
    pub events_published_total: IntCounter,

    /// Pools that reached full funding
    pub pools_funded_total: IntCounter,

    /// Cents moved, by flow direction
    pub funds_moved_total: IntCounterVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("engine_operations_total", "Operations processed"),
            &["op", "status"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "engine_operation_duration_seconds",
                "Operation latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
            &["op"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let events_published_total = IntCounter::new(
            "engine_events_published_total",
            "Events published to the bus",
        )?;
        registry.register(Box::new(events_published_total.clone()))?;

        let pools_funded_total = IntCounter::new(
            "engine_pools_funded_total",
            "Pools that reached full funding",
        )?;
        registry.register(Box::new(pools_funded_total.clone()))?;

        let funds_moved_total = IntCounterVec::new(
            Opts::new("engine_funds_moved_total", "Cents moved, by flow"),
            &["flow"],
        )?;
        registry.register(Box::new(funds_moved_total.clone()))?;

        Ok(Self {
            operations_total,
            operation_duration,
            events_published_total,
            pools_funded_total,
            funds_moved_total,
            registry,
        })
    }

    /// Record a completed operation
    pub fn record_operation(&self, op: &str, ok: bool, duration_seconds: f64) {
        let status = if ok { "ok" } else { "error" };
        self.operations_total.with_label_values(&[op, status]).inc();
        self.operation_duration
            .with_label_values(&[op])
            .observe(duration_seconds);
    }

    /// Record a published event
    pub fn record_event_published(&self) {
        self.events_published_total.inc();
    }

    /// Record a pool reaching full funding
    pub fn record_pool_funded(&self) {
        self.pools_funded_total.inc();
    }

    /// Record cents moved in a given flow direction
    pub fn record_funds_moved(&self, flow: &str, amount: u64) {
        self.funds_moved_total
            .with_label_values(&[flow])
            .inc_by(amount);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
