//! In-memory credit store and customer index
//!
//! # Layout
//!
//! - `records` - one `CreditRecord` per referral (key: referral_id)
//! - `index` - customer_key -> referral ids in approval order
//!
//! `LedgerState` owns both and keeps them consistent: every id in the index
//! has a record, and every record is reachable from exactly one customer.

use crate::types::{CreditRecord, CustomerKey, ReferralId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Insertion-ordered referral sets per customer
#[derive(Debug, Default)]
pub struct CustomerIndex {
    entries: HashMap<CustomerKey, Vec<ReferralId>>,
}

impl CustomerIndex {
    /// Add a referral to a customer's set; no-op if already present
    pub fn insert(&mut self, customer: &CustomerKey, referral_id: &ReferralId) {
        let ids = self.entries.entry(customer.clone()).or_default();
        if !ids.contains(referral_id) {
            ids.push(referral_id.clone());
        }
    }

    /// Remove a referral from a customer's set
    pub fn remove(&mut self, customer: &CustomerKey, referral_id: &ReferralId) {
        if let Some(ids) = self.entries.get_mut(customer) {
            ids.retain(|id| id != referral_id);
            if ids.is_empty() {
                self.entries.remove(customer);
            }
        }
    }

    /// Referral ids for a customer, oldest first
    pub fn get(&self, customer: &CustomerKey) -> &[ReferralId] {
        self.entries
            .get(customer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of customers with at least one referral
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no customer has credit
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fields written by an upsert
#[derive(Debug, Clone)]
pub struct CreditUpsert {
    /// Referral key
    pub referral_id: ReferralId,
    /// Owning customer
    pub customer_key: CustomerKey,
    /// New remaining commission
    pub amount: Decimal,
    /// Affiliate provenance
    pub affiliate_id: Option<String>,
    /// Affiliate provenance
    pub affiliate_email: Option<String>,
}

/// Credit records plus the derived customer index
#[derive(Debug, Default)]
pub struct LedgerState {
    records: HashMap<ReferralId, CreditRecord>,
    index: CustomerIndex,
}

impl LedgerState {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a record. Re-approval replaces the remaining
    /// commission instead of adding to it.
    pub fn upsert(&mut self, upsert: CreditUpsert, now: DateTime<Utc>) -> CreditRecord {
        let CreditUpsert {
            referral_id,
            customer_key,
            amount,
            affiliate_id,
            affiliate_email,
        } = upsert;

        let record = match self.records.get_mut(&referral_id) {
            Some(existing) => {
                if existing.customer_key != customer_key {
                    self.index.remove(&existing.customer_key, &referral_id);
                    existing.customer_key = customer_key.clone();
                }
                existing.remaining_commission = amount;
                existing.affiliate_id = affiliate_id;
                existing.affiliate_email = affiliate_email;
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let record = CreditRecord {
                    referral_id: referral_id.clone(),
                    customer_key: customer_key.clone(),
                    remaining_commission: amount,
                    affiliate_id,
                    affiliate_email,
                    created_at: now,
                    updated_at: now,
                };
                self.records.insert(referral_id.clone(), record.clone());
                record
            }
        };

        self.index.insert(&customer_key, &referral_id);
        record
    }

    /// Customer a referral currently belongs to
    pub fn owner(&self, referral_id: &ReferralId) -> Option<&CustomerKey> {
        self.records.get(referral_id).map(|r| &r.customer_key)
    }

    /// Get record by referral ID
    pub fn get(&self, referral_id: &ReferralId) -> Option<&CreditRecord> {
        self.records.get(referral_id)
    }

    /// Referral ids for a customer, oldest first
    pub fn referral_ids(&self, customer: &CustomerKey) -> Vec<ReferralId> {
        self.index.get(customer).to_vec()
    }

    /// Records for a customer, oldest first. Ids without a record are skipped.
    pub fn records_for(&self, customer: &CustomerKey) -> Vec<CreditRecord> {
        self.index
            .get(customer)
            .iter()
            .filter_map(|id| self.records.get(id))
            .cloned()
            .collect()
    }

    /// Sum of remaining commission across a customer's referrals.
    ///
    /// Saturates at `Decimal::MAX`; `upsert_total` keeps stored totals below it.
    pub fn total_for(&self, customer: &CustomerKey) -> Decimal {
        self.index
            .get(customer)
            .iter()
            .filter_map(|id| self.records.get(id))
            .fold(Decimal::ZERO, |total, r| {
                total.saturating_add(r.remaining_commission)
            })
    }

    /// Customer total after applying `upsert`, or `None` if it would not fit
    /// in a `Decimal`
    pub fn upsert_total(&self, upsert: &CreditUpsert) -> Option<Decimal> {
        self.index
            .get(&upsert.customer_key)
            .iter()
            .filter(|id| **id != upsert.referral_id)
            .filter_map(|id| self.records.get(id))
            .try_fold(upsert.amount, |total, r| {
                total.checked_add(r.remaining_commission)
            })
    }

    /// Take up to `wanted` from a referral.
    ///
    /// Returns the amount taken, or `None` if the referral is missing or has
    /// nothing left.
    pub fn debit(
        &mut self,
        referral_id: &ReferralId,
        wanted: Decimal,
        now: DateTime<Utc>,
    ) -> Option<Decimal> {
        let record = self.records.get_mut(referral_id)?;
        if record.remaining_commission <= Decimal::ZERO || wanted <= Decimal::ZERO {
            return None;
        }

        let used = record.remaining_commission.min(wanted);
        record.remaining_commission -= used;
        record.updated_at = now;
        Some(used)
    }

    /// Give back a previous debit
    pub fn restore(&mut self, referral_id: &ReferralId, amount: Decimal, now: DateTime<Utc>) {
        if let Some(record) = self.records.get_mut(referral_id) {
            record.remaining_commission += amount;
            record.updated_at = now;
        }
    }

    /// Number of stored records
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Number of indexed customers
    pub fn customer_count(&self) -> usize {
        self.index.len()
    }
}
