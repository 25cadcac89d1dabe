//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `credit_ledger_credits_stored_total` - Referral approvals stored
//! - `credit_ledger_approvals_rejected_total` - Approvals rejected as malformed
//! - `credit_ledger_consumptions_total` - Consumptions that debited credit
//! - `credit_ledger_credit_consumed` - Currency units debited
//! - `credit_ledger_sync_failures_total` - Failed or timed out sync calls
//! - `credit_ledger_consume_duration_seconds` - Histogram of consume latencies

use prometheus::{Counter, Histogram, HistogramOpts, IntCounter, Registry};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Approvals stored
    pub credits_stored: IntCounter,

    /// Approvals rejected
    pub approvals_rejected: IntCounter,

    /// Consumptions that debited something
    pub consumptions: IntCounter,

    /// Total credit debited
    pub credit_consumed: Counter,

    /// Sync failures (including timeouts)
    pub sync_failures: IntCounter,

    /// Consume duration histogram
    pub consume_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("credits_stored", &self.credits_stored.get())
            .field("consumptions", &self.consumptions.get())
            .field("sync_failures", &self.sync_failures.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let credits_stored = IntCounter::new(
            "credit_ledger_credits_stored_total",
            "Referral approvals stored as credit",
        )?;
        registry.register(Box::new(credits_stored.clone()))?;

        let approvals_rejected = IntCounter::new(
            "credit_ledger_approvals_rejected_total",
            "Referral approvals rejected as malformed",
        )?;
        registry.register(Box::new(approvals_rejected.clone()))?;

        let consumptions = IntCounter::new(
            "credit_ledger_consumptions_total",
            "Consumptions that debited credit",
        )?;
        registry.register(Box::new(consumptions.clone()))?;

        let credit_consumed = Counter::new(
            "credit_ledger_credit_consumed",
            "Currency units of credit debited",
        )?;
        registry.register(Box::new(credit_consumed.clone()))?;

        let sync_failures = IntCounter::new(
            "credit_ledger_sync_failures_total",
            "Commission sync calls that failed or timed out",
        )?;
        registry.register(Box::new(sync_failures.clone()))?;

        let consume_duration = Histogram::with_opts(
            HistogramOpts::new(
                "credit_ledger_consume_duration_seconds",
                "Histogram of consume latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0, 10.0]),
        )?;
        registry.register(Box::new(consume_duration.clone()))?;

        Ok(Self {
            credits_stored,
            approvals_rejected,
            consumptions,
            credit_consumed,
            sync_failures,
            consume_duration,
            registry,
        })
    }

    /// Record stored approval
    pub fn record_credit_stored(&self) {
        self.credits_stored.inc();
    }

    /// Record rejected approval
    pub fn record_approval_rejected(&self) {
        self.approvals_rejected.inc();
    }

    /// Record a consumption and the amount it debited
    pub fn record_consumption(&self, used: Decimal) {
        if used > Decimal::ZERO {
            self.consumptions.inc();
            self.credit_consumed.inc_by(used.to_f64().unwrap_or(0.0));
        }
    }

    /// Record sync failure
    pub fn record_sync_failure(&self) {
        self.sync_failures.inc();
    }

    /// Record consume duration
    pub fn record_consume_duration(&self, duration_seconds: f64) {
        self.consume_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.credits_stored.get(), 0);
        assert_eq!(metrics.sync_failures.get(), 0);

        // Each collector owns its registry, so a second one must not clash.
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_record_consumption_skips_zero() {
        let metrics = Metrics::new().unwrap();
        metrics.record_consumption(Decimal::ZERO);
        metrics.record_consumption(dec!(12.5));

        assert_eq!(metrics.consumptions.get(), 1);
        assert!((metrics.credit_consumed.get() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_registry_gathers_all_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_credit_stored();
        metrics.record_consume_duration(0.02);
        assert_eq!(metrics.registry().gather().len(), 6);
    }
}
