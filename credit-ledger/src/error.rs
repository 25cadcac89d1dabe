//! Error types for the credit ledger

use crate::types::{Allocation, ReferralId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Referral approval could not be turned into a credit record
    #[error("Invalid referral approval: {0}")]
    InvalidApproval(String),

    /// Consumption request amount is unusable
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Commission sync failed part way through a consumption
    #[error("{0}")]
    SyncFailed(Box<ConsumeFailure>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}

impl Error {
    /// Failure details if this is a sync failure
    pub fn consume_failure(&self) -> Option<&ConsumeFailure> {
        match self {
            Error::SyncFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Details of an aborted consumption.
///
/// `committed` lists the debits that still stand on both sides after the
/// failure was handled, so callers can alert without re-deriving state.
#[derive(Debug, Clone)]
pub struct ConsumeFailure {
    /// Referral whose sync failed
    pub referral_id: ReferralId,

    /// Amount restored to that referral
    pub rolled_back: Decimal,

    /// Allocations that remain debited
    pub committed: Vec<Allocation>,

    /// Underlying sync error
    pub reason: SyncError,
}

impl ConsumeFailure {
    /// Total amount that remains debited
    pub fn committed_total(&self) -> Decimal {
        self.committed.iter().map(|a| a.used).sum()
    }
}

impl std::fmt::Display for ConsumeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Commission sync failed for referral {} ({} rolled back, {} committed): {}",
            self.referral_id,
            self.rolled_back,
            self.committed_total(),
            self.reason
        )
    }
}

/// Errors reported by a commission sync adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Call did not finish within the configured bound
    #[error("Timeout after {millis}ms")]
    Timeout {
        /// Timeout in milliseconds
        millis: u64,
    },

    /// Remote platform answered with a non-success status
    #[error("Referral platform rejected adjustment {status}: {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Network or client failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Adapter refused to serve the call
    #[error("Sync unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}
