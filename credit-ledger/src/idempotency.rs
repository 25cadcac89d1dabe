//! Duplicate delivery guard
//!
//! Upstream webhooks are delivered at least once. The ledger cannot tell a
//! retried subscription charge from a second real one, so the layer above it
//! checks each external event id here before calling `store_credit` or
//! `consume`.

use crate::config::IdempotencyConfig;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Insertions between lazy prunes
const PRUNE_EVERY: usize = 1024;

/// Remembers external event ids for a bounded time
#[derive(Debug)]
pub struct ProcessedEvents {
    seen: DashMap<String, Instant>,
    ttl: Duration,
    inserts: AtomicUsize,
}

impl ProcessedEvents {
    /// Create guard with the given retention
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
            inserts: AtomicUsize::new(0),
        }
    }

    /// Create guard with the configured retention
    pub fn from_config(config: &IdempotencyConfig) -> Self {
        Self::new(config.ttl())
    }

    /// Retention of remembered ids
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// True the first time an event id is seen within the TTL
    pub fn first_delivery(&self, event_id: &str) -> bool {
        let now = Instant::now();

        let first = match self.seen.entry(event_id.to_string()) {
            Entry::Occupied(mut seen) => {
                if now.duration_since(*seen.get()) < self.ttl {
                    false
                } else {
                    seen.insert(now);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        };

        if first && self.inserts.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }

        first
    }

    /// Forget an event id, e.g. when its processing failed and a redelivery
    /// should be accepted
    pub fn forget(&self, event_id: &str) {
        self.seen.remove(event_id);
    }

    /// Drop expired ids
    pub fn prune(&self) {
        let now = Instant::now();
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < self.ttl);
    }

    /// Number of remembered ids
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True if nothing is remembered
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_delivery_rejected() {
        let guard = ProcessedEvents::new(Duration::from_secs(60));
        assert!(guard.first_delivery("evt_1"));
        assert!(!guard.first_delivery("evt_1"));
        assert!(guard.first_delivery("evt_2"));
    }

    #[tokio::test]
    async fn test_forget_allows_redelivery() {
        let guard = ProcessedEvents::new(Duration::from_secs(60));
        assert!(guard.first_delivery("evt_1"));
        guard.forget("evt_1");
        assert!(guard.first_delivery("evt_1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_ids_are_accepted_and_pruned() {
        let guard = ProcessedEvents::new(Duration::from_secs(10));
        assert!(guard.first_delivery("evt_1"));
        assert!(guard.first_delivery("evt_2"));

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(guard.first_delivery("evt_1"));
        guard.prune();
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_ttl_is_enforced() {
        let config = IdempotencyConfig { ttl_secs: 30 };
        let guard = ProcessedEvents::from_config(&config);
        assert_eq!(guard.ttl(), Duration::from_secs(30));
        assert!(guard.first_delivery("evt_1"));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!guard.first_delivery("evt_1"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(guard.first_delivery("evt_1"));
    }
}
