//! Per-customer mutual exclusion
//!
//! Consumption awaits the referral platform while holding its customer's
//! lock, so the table hands out async mutexes. Different customers never
//! contend.

use crate::types::CustomerKey;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard for one customer's critical section
pub type CustomerGuard = OwnedMutexGuard<()>;

/// Keyed mutex table
#[derive(Debug, Default)]
pub struct CustomerLocks {
    locks: DashMap<CustomerKey, Arc<Mutex<()>>>,
}

impl CustomerLocks {
    /// Create empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, customer: &CustomerKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(customer.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock one customer
    pub async fn lock(&self, customer: &CustomerKey) -> CustomerGuard {
        // Clone the Arc out first so no map shard is held across the await.
        let slot = self.slot(customer);
        slot.lock_owned().await
    }

    /// Lock several customers in a fixed order
    pub async fn lock_all(&self, customers: &[&CustomerKey]) -> Vec<CustomerGuard> {
        let mut keys: Vec<&CustomerKey> = customers.to_vec();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of customers that have ever been locked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if no customer has been locked
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
