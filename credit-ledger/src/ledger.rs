//! Credit ledger and consumption allocator
//!
//! This module ties together the in-memory store, the per-customer locks and
//! the commission sync adapter into the API used by webhook handlers.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger::{Config, CreditLedger, CustomerKey, RecordingSync, ReferralApproval};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> credit_ledger::Result<()> {
//!     let ledger = CreditLedger::new(Config::default(), Arc::new(RecordingSync::new()))?;
//!
//!     let approval = ReferralApproval::new("4521", "buyer@example.com", Decimal::new(1500, 2));
//!     ledger.store_credit(approval).await?;
//!
//!     let customer = CustomerKey::new("buyer@example.com");
//!     let consumption = ledger.consume(&customer, Decimal::new(1000, 2)).await?;
//!     assert_eq!(consumption.used, Decimal::new(1000, 2));
//!
//!     Ok(())
//! }
//! ```

use crate::{
    config::RollbackPolicy,
    error::{ConsumeFailure, SyncError},
    locks::CustomerLocks,
    metrics::Metrics,
    store::{CreditUpsert, LedgerState},
    sync::CommissionSync,
    types::{Allocation, Consumption, CreditRecord, CustomerKey, ReferralApproval, ReferralId},
    Config, Error, Result,
};
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-referral credit ledger.
///
/// One instance lives for the whole process; share it behind an `Arc`.
pub struct CreditLedger {
    /// Records and customer index
    state: RwLock<LedgerState>,

    /// Serializes consumption per customer
    locks: CustomerLocks,

    /// Referral platform adapter
    sync: Arc<dyn CommissionSync>,

    /// Configuration
    config: Config,

    /// Metrics
    metrics: Metrics,
}

impl std::fmt::Debug for CreditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditLedger")
            .field("sync", &self.sync.name())
            .field("records", &self.record_count())
            .field("customers", &self.customer_count())
            .finish()
    }
}

impl CreditLedger {
    /// Create an empty ledger
    pub fn new(config: Config, sync: Arc<dyn CommissionSync>) -> Result<Self> {
        let metrics = Metrics::new()?;

        info!(
            service = %config.service_name,
            version = %config.service_version,
            adapter = sync.name(),
            rollback_policy = ?config.allocation.rollback_policy,
            "Credit ledger opened"
        );

        Ok(Self {
            state: RwLock::new(LedgerState::new()),
            locks: CustomerLocks::new(),
            sync,
            config,
            metrics,
        })
    }

    /// Store credit for an approved referral.
    ///
    /// Re-approval of the same referral replaces its remaining commission.
    /// Malformed approvals are rejected without touching state.
    pub async fn store_credit(&self, approval: ReferralApproval) -> Result<CreditRecord> {
        let (customer_key, amount) = match Self::validate(&approval) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(referral_id = %approval.referral_id, error = %e, "Rejected referral approval");
                self.metrics.record_approval_rejected();
                return Err(e);
            }
        };

        let upsert = CreditUpsert {
            referral_id: approval.referral_id,
            customer_key,
            amount,
            affiliate_id: approval.affiliate_id,
            affiliate_email: approval.affiliate_email,
        };

        loop {
            let previous = self.owner_of(&upsert.referral_id);

            let mut keys = vec![&upsert.customer_key];
            if let Some(previous) = previous.as_ref() {
                keys.push(previous);
            }
            let _guards = self.locks.lock_all(&keys).await;

            match self.upsert_if_owner(previous.as_ref(), &upsert) {
                Ok(Some(record)) => {
                    info!(
                        referral_id = %record.referral_id,
                        customer = %record.customer_key,
                        amount = %record.remaining_commission,
                        "Stored referral credit"
                    );
                    self.metrics.record_credit_stored();
                    return Ok(record);
                }
                // Owner moved while we waited for the locks.
                Ok(None) => {
                    debug!(
                        referral_id = %upsert.referral_id,
                        "Referral re-attributed concurrently, retrying"
                    );
                }
                Err(e) => {
                    warn!(referral_id = %upsert.referral_id, error = %e, "Rejected referral approval");
                    self.metrics.record_approval_rejected();
                    return Err(e);
                }
            }
        }
    }

    /// Total remaining credit for a customer. Unknown customers have zero.
    pub fn total_credit_for(&self, customer: &CustomerKey) -> Decimal {
        self.state.read().total_for(customer)
    }

    /// Debit up to `requested` from the customer's referrals, oldest first,
    /// pushing a negative adjustment to the referral platform per referral.
    ///
    /// Returns `Error::SyncFailed` if an adjustment fails or times out. The
    /// failing referral is restored; earlier ones are handled per the
    /// configured `RollbackPolicy` and listed in the failure's `committed`.
    pub async fn consume(&self, customer: &CustomerKey, requested: Decimal) -> Result<Consumption> {
        if requested < Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "cannot consume negative amount {}",
                requested
            )));
        }

        // Unknown customers never get a lock slot.
        if requested.is_zero() || self.state.read().referral_ids(customer).is_empty() {
            return Ok(Consumption::empty(customer.clone(), requested));
        }

        let started = Instant::now();
        let _guard = self.locks.lock(customer).await;
        let result = self.allocate(customer, requested).await;
        self.metrics
            .record_consume_duration(started.elapsed().as_secs_f64());
        result
    }

    async fn allocate(&self, customer: &CustomerKey, requested: Decimal) -> Result<Consumption> {
        let consumption_id = Uuid::now_v7();
        let referral_ids = self.state.read().referral_ids(customer);

        let mut still_needed = requested;
        let mut breakdown: Vec<Allocation> = Vec::new();

        for referral_id in referral_ids {
            if still_needed <= Decimal::ZERO {
                break;
            }

            // Decrement before the sync so no concurrent reader sees credit
            // that is already promised to the platform.
            let Some(used) = self.debit(&referral_id, still_needed) else {
                continue;
            };

            debug!(
                %consumption_id,
                referral_id = %referral_id,
                used = %used,
                "Debited referral credit"
            );

            if let Err(reason) = self.push_adjustment(&referral_id, -used).await {
                self.restore(&referral_id, used);
                self.metrics.record_sync_failure();

                error!(
                    %consumption_id,
                    customer = %customer,
                    referral_id = %referral_id,
                    rolled_back = %used,
                    committed = breakdown.len(),
                    error = %reason,
                    "Commission sync failed, consumption aborted"
                );

                let committed = match self.config.allocation.rollback_policy {
                    RollbackPolicy::PartialCommit => breakdown,
                    RollbackPolicy::Compensate => self.compensate(consumption_id, breakdown).await,
                };

                return Err(Error::SyncFailed(Box::new(ConsumeFailure {
                    referral_id,
                    rolled_back: used,
                    committed,
                    reason,
                })));
            }

            still_needed -= used;
            breakdown.push(Allocation { referral_id, used });
        }

        let used = requested - still_needed;
        self.metrics.record_consumption(used);

        info!(
            %consumption_id,
            customer = %customer,
            requested = %requested,
            used = %used,
            referrals = breakdown.len(),
            "Consumed credit"
        );

        Ok(Consumption {
            consumption_id,
            customer_key: customer.clone(),
            requested,
            used,
            breakdown,
        })
    }

    /// Reverse committed debits, newest first. Returns the ones that could
    /// not be reversed, in their original order.
    async fn compensate(&self, consumption_id: Uuid, committed: Vec<Allocation>) -> Vec<Allocation> {
        let mut remaining = Vec::new();

        for allocation in committed.into_iter().rev() {
            match self
                .push_adjustment(&allocation.referral_id, allocation.used)
                .await
            {
                Ok(()) => {
                    self.restore(&allocation.referral_id, allocation.used);
                    warn!(
                        %consumption_id,
                        referral_id = %allocation.referral_id,
                        amount = %allocation.used,
                        "Compensated referral debit"
                    );
                }
                Err(e) => {
                    self.metrics.record_sync_failure();
                    error!(
                        %consumption_id,
                        referral_id = %allocation.referral_id,
                        amount = %allocation.used,
                        error = %e,
                        "Compensation failed, debit stands"
                    );
                    remaining.push(allocation);
                }
            }
        }

        remaining.reverse();
        remaining
    }

    async fn push_adjustment(
        &self,
        referral_id: &ReferralId,
        signed_amount: Decimal,
    ) -> std::result::Result<(), SyncError> {
        let timeout = self.config.sync.timeout();
        match tokio::time::timeout(timeout, self.sync.apply_adjustment(referral_id, signed_amount))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                millis: self.config.sync.timeout_ms,
            }),
        }
    }

    fn validate(approval: &ReferralApproval) -> Result<(CustomerKey, Decimal)> {
        if approval.referral_id.as_str().is_empty() {
            return Err(Error::InvalidApproval("referral id is empty".to_string()));
        }
        let amount = approval.commission()?;
        let customer_key = approval.customer_key()?;
        Ok((customer_key, amount))
    }

    fn owner_of(&self, referral_id: &ReferralId) -> Option<CustomerKey> {
        self.state.read().owner(referral_id).cloned()
    }

    fn upsert_if_owner(
        &self,
        expected: Option<&CustomerKey>,
        upsert: &CreditUpsert,
    ) -> Result<Option<CreditRecord>> {
        let mut state = self.state.write();
        if state.owner(&upsert.referral_id) != expected {
            return Ok(None);
        }
        if state.upsert_total(upsert).is_none() {
            return Err(Error::InvalidApproval(format!(
                "referral {} commission {} overflows the credit total for {}",
                upsert.referral_id, upsert.amount, upsert.customer_key
            )));
        }
        Ok(Some(state.upsert(upsert.clone(), Utc::now())))
    }

    fn debit(&self, referral_id: &ReferralId, wanted: Decimal) -> Option<Decimal> {
        self.state.write().debit(referral_id, wanted, Utc::now())
    }

    fn restore(&self, referral_id: &ReferralId, amount: Decimal) {
        self.state.write().restore(referral_id, amount, Utc::now());
    }

    /// Snapshot of one referral's record
    pub fn record(&self, referral_id: &ReferralId) -> Option<CreditRecord> {
        self.state.read().get(referral_id).cloned()
    }

    /// Snapshot of a customer's records in allocation order
    pub fn records_for(&self, customer: &CustomerKey) -> Vec<CreditRecord> {
        self.state.read().records_for(customer)
    }

    /// Number of stored referral records
    pub fn record_count(&self) -> usize {
        self.state.read().record_count()
    }

    /// Number of customers holding credit records
    pub fn customer_count(&self) -> usize {
        self.state.read().customer_count()
    }

    /// Ledger metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Ledger configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
