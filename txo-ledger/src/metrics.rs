//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `txo_transfers_total` - Committed transfers with a source wallet
//! - `txo_mints_total` - Committed external mints
//! - `txo_transfer_failures_total` - Rejected transfers and mints
//! - `txo_transfer_refs` - Histogram of source references per transfer
//! - `txo_transfer_duration_seconds` - Histogram of transfer latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed transfers
    pub transfers_total: IntCounter,

    /// Committed mints
    pub mints_total: IntCounter,

    /// Rejected operations
    pub failures_total: IntCounter,

    /// References per transfer
    pub transfer_refs: Histogram,

    /// Transfer duration histogram
    pub transfer_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transfers_total =
            IntCounter::new("txo_transfers_total", "Committed transfers with a source wallet")?;
        registry.register(Box::new(transfers_total.clone()))?;

        let mints_total = IntCounter::new("txo_mints_total", "Committed external mints")?;
        registry.register(Box::new(mints_total.clone()))?;

        let failures_total =
            IntCounter::new("txo_transfer_failures_total", "Rejected transfers and mints")?;
        registry.register(Box::new(failures_total.clone()))?;

        let transfer_refs = Histogram::with_opts(
            HistogramOpts::new("txo_transfer_refs", "Source references per transfer")
                .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
        )?;
        registry.register(Box::new(transfer_refs.clone()))?;

        let transfer_duration = Histogram::with_opts(
            HistogramOpts::new("txo_transfer_duration_seconds", "Histogram of transfer latencies")
                .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250]),
        )?;
        registry.register(Box::new(transfer_duration.clone()))?;

        Ok(Self {
            transfers_total,
            mints_total,
            failures_total,
            transfer_refs,
            transfer_duration,
            registry,
        })
    }

    /// Record a committed transfer
    pub fn record_transfer(&self, ref_count: usize, duration_seconds: f64) {
        self.transfers_total.inc();
        self.transfer_refs.observe(ref_count as f64);
        self.transfer_duration.observe(duration_seconds);
    }

    /// Record a committed mint
    pub fn record_mint(&self, duration_seconds: f64) {
        self.mints_total.inc();
        self.transfer_duration.observe(duration_seconds);
    }

    /// Record a rejected operation
    pub fn record_failure(&self) {
        self.failures_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("transfers_total", &self.transfers_total.get())
            .field("mints_total", &self.mints_total.get())
            .field("failures_total", &self.failures_total.get())
            .finish()
    }
}
