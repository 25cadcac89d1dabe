//! Referral Credit Ledger
//!
//! Tracks commission credit earned through affiliate referrals and spends it
//! against customers' subscription charges, keeping the referral platform's
//! commission balances in step.
//!
//! # Architecture
//!
//! - **Store + Index**: one record per referral, grouped per customer in approval order
//! - **Per-customer lock**: consumption for one customer is serialized, others run in parallel
//! - **Speculative debit**: local credit drops before the platform is told, and is restored on failure
//! - **Pluggable sync**: the platform is reached through the `CommissionSync` trait
//!
//! # Invariants
//!
//! - Remaining commission is never negative
//! - A failed sync restores its referral exactly
//! - Credit is spent oldest approval first
//! - Concurrent consumptions never debit more than the customer holds

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod http_sync;
pub mod idempotency;
pub mod ledger;
pub mod locks;
pub mod metrics;
pub mod store;
pub mod sync;
pub mod types;

// Re-exports
pub use config::{Config, RollbackPolicy};
pub use error::{ConsumeFailure, Error, Result, SyncError};
pub use http_sync::HttpCommissionSync;
pub use idempotency::ProcessedEvents;
pub use ledger::CreditLedger;
pub use sync::{CommissionSync, RecordingSync};
pub use types::{
    Allocation, Consumption, CreditRecord, CustomerKey, ReferralApproval, ReferralId,
};
