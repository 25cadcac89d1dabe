//! Commission sync adapter interface
//!
//! The ledger pushes a signed balance adjustment to the referral platform
//! for every referral it debits. Debits are negative, compensations positive.

use crate::error::SyncError;
use crate::types::ReferralId;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Remote commission balance adjuster
#[async_trait]
pub trait CommissionSync: Send + Sync {
    /// Apply a signed adjustment to a referral's commission balance
    async fn apply_adjustment(
        &self,
        referral_id: &ReferralId,
        signed_amount: Decimal,
    ) -> std::result::Result<(), SyncError>;

    /// Adapter name for logs
    fn name(&self) -> &str;
}

/// Adjustment seen by `RecordingSync`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    /// Referral adjusted
    pub referral_id: ReferralId,
    /// Signed amount
    pub amount: Decimal,
}

#[derive(Debug, Default)]
struct RecordingState {
    applied: Vec<Adjustment>,
    attempts: usize,
    fail_debits: HashSet<ReferralId>,
    fail_credits: HashSet<ReferralId>,
    delay: Option<Duration>,
}

/// In-memory adapter that records successful adjustments.
///
/// Failures and latency can be scripted per referral, which makes it the
/// adapter of choice for tests and local runs without platform credentials.
#[derive(Debug, Default)]
pub struct RecordingSync {
    state: Mutex<RecordingState>,
}

impl RecordingSync {
    /// Create adapter that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject debits for a referral
    pub fn fail_on(&self, referral_id: impl Into<ReferralId>) {
        self.state.lock().fail_debits.insert(referral_id.into());
    }

    /// Reject compensating credits for a referral
    pub fn fail_compensation_on(&self, referral_id: impl Into<ReferralId>) {
        self.state.lock().fail_credits.insert(referral_id.into());
    }

    /// Clear scripted failures for a referral
    pub fn recover(&self, referral_id: &ReferralId) {
        let mut state = self.state.lock();
        state.fail_debits.remove(referral_id);
        state.fail_credits.remove(referral_id);
    }

    /// Delay every call
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Successful adjustments in call order
    pub fn adjustments(&self) -> Vec<Adjustment> {
        self.state.lock().applied.clone()
    }

    /// Number of calls, including failed ones
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Net applied adjustment for a referral
    pub fn net_for(&self, referral_id: &ReferralId) -> Decimal {
        self.state
            .lock()
            .applied
            .iter()
            .filter(|a| &a.referral_id == referral_id)
            .map(|a| a.amount)
            .sum()
    }
}

#[async_trait]
impl CommissionSync for RecordingSync {
    async fn apply_adjustment(
        &self,
        referral_id: &ReferralId,
        signed_amount: Decimal,
    ) -> std::result::Result<(), SyncError> {
        let delay = {
            let mut state = self.state.lock();
            state.attempts += 1;
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let scripted = if signed_amount.is_sign_negative() {
            &state.fail_debits
        } else {
            &state.fail_credits
        };
        if scripted.contains(referral_id) {
            return Err(SyncError::Unavailable(format!(
                "scripted failure for referral {}",
                referral_id
            )));
        }

        debug!(referral_id = %referral_id, amount = %signed_amount, "Recorded adjustment");
        state.applied.push(Adjustment {
            referral_id: referral_id.clone(),
            amount: signed_amount,
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
