//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `volta_accounts_created_total` - Accounts created
//! - `volta_transfers_total` - Committed transfers
//! - `volta_loans_issued_total` - Loans issued
//! - `volta_loans_repaid_total` - Loans repaid
//! - `volta_rejected_operations_total{kind}` - Rejected operations by error kind
//! - `volta_chain_height` - Number of chain records
//! - `volta_commit_duration_seconds` - Histogram of commit latencies

use crate::error::ErrorKind;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Accounts created
    pub accounts_created: IntCounter,

    /// Committed transfers
    pub transfers_total: IntCounter,

    /// Loans issued
    pub loans_issued: IntCounter,

    /// Loans repaid
    pub loans_repaid: IntCounter,

    /// Rejected operations by kind
    pub rejected: IntCounterVec,

    /// Chain height
    pub chain_height: IntGauge,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let accounts_created =
            IntCounter::new("volta_accounts_created_total", "Accounts created")?;
        registry.register(Box::new(accounts_created.clone()))?;

        let transfers_total = IntCounter::new("volta_transfers_total", "Committed transfers")?;
        registry.register(Box::new(transfers_total.clone()))?;

        let loans_issued = IntCounter::new("volta_loans_issued_total", "Loans issued")?;
        registry.register(Box::new(loans_issued.clone()))?;

        let loans_repaid = IntCounter::new("volta_loans_repaid_total", "Loans repaid")?;
        registry.register(Box::new(loans_repaid.clone()))?;

        let rejected = IntCounterVec::new(
            Opts::new(
                "volta_rejected_operations_total",
                "Rejected operations by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejected.clone()))?;

        let chain_height = IntGauge::new("volta_chain_height", "Number of chain records")?;
        registry.register(Box::new(chain_height.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "volta_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            accounts_created,
            transfers_total,
            loans_issued,
            loans_repaid,
            rejected,
            chain_height,
            commit_duration,
            registry,
        })
    }

    /// Record a rejected operation
    pub fn record_rejection(&self, kind: ErrorKind) {
        self.rejected.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record commit duration
    pub fn record_commit_duration(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Update chain height
    pub fn set_chain_height(&self, height: u64) {
        self.chain_height.set(height as i64);
    }

    /// Rejections recorded for `kind`
    pub fn rejections(&self, kind: ErrorKind) -> u64 {
        self.rejected.with_label_values(&[kind.as_str()]).get()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
