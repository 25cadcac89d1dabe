//! Referral platform REST adapter

use crate::{
    config::SyncConfig,
    error::SyncError,
    sync::CommissionSync,
    types::ReferralId,
    Error, Result,
};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Pushes balance adjustments to the referral platform over HTTP
pub struct HttpCommissionSync {
    config: SyncConfig,
    client: Client,
}

impl std::fmt::Debug for HttpCommissionSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCommissionSync")
            .field("base_url", &self.config.base_url)
            .field("timeout_ms", &self.config.timeout_ms)
            .finish()
    }
}

impl HttpCommissionSync {
    /// Create new adapter
    pub fn new(config: SyncConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(Error::Config("sync.base_url must be set".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn adjustment_url(&self, referral_id: &ReferralId) -> String {
        format!(
            "{}/referrals/{}/balance-adjustments",
            self.config.base_url.trim_end_matches('/'),
            referral_id
        )
    }
}

#[async_trait]
impl CommissionSync for HttpCommissionSync {
    async fn apply_adjustment(
        &self,
        referral_id: &ReferralId,
        signed_amount: Decimal,
    ) -> std::result::Result<(), SyncError> {
        let url = self.adjustment_url(referral_id);
        debug!(referral_id = %referral_id, amount = %signed_amount, "Posting balance adjustment");

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.config.api_key)
            .json(&json!({
                "amount": signed_amount.to_string(),
                "currency": self.config.currency,
            }))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        warn!(referral_id = %referral_id, status, "Referral platform rejected adjustment");
        Err(SyncError::Rejected { status, message })
    }

    fn name(&self) -> &str {
        "referral-platform-http"
    }
}
