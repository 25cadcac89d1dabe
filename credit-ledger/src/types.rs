//! Core types for the credit ledger
//!
//! All money amounts are `Decimal` so that repeated debits and rollbacks
//! restore balances exactly.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Referral identifier on the affiliate platform.
///
/// Platforms hand these out as strings or integers; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReferralId(String);

impl ReferralId {
    /// Create new referral ID, trimming surrounding whitespace
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.trim().len() == id.len() {
            Self(id)
        } else {
            Self(id.trim().to_string())
        }
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReferralId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for ReferralId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ReferralId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => ReferralId::new(s),
            Raw::Number(n) => ReferralId(n.to_string()),
        })
    }
}

/// Customer identity that credit is attributed to.
///
/// Emails are compared case-insensitively, so keys are stored trimmed and
/// lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerKey(String);

impl CustomerKey {
    /// Create a key from any identity string, normalizing it
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    /// Create a key from an email address
    pub fn email(email: &str) -> Option<Self> {
        let key = Self::new(email);
        if key.0.is_empty() || !key.0.contains('@') {
            return None;
        }
        Some(key)
    }

    /// Fallback key for customers known only by platform ID
    pub fn customer_id(id: &str) -> Option<Self> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        Some(Self(format!("customer:{}", id)))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remaining credit held against one referral
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditRecord {
    /// Referral this credit came from
    pub referral_id: ReferralId,

    /// Customer the credit is attributed to
    pub customer_key: CustomerKey,

    /// Commission still available to spend (never negative)
    pub remaining_commission: Decimal,

    /// Affiliate that earned the commission
    pub affiliate_id: Option<String>,

    /// Affiliate contact email
    pub affiliate_email: Option<String>,

    /// First time this referral was stored
    pub created_at: DateTime<Utc>,

    /// Last upsert or debit
    pub updated_at: DateTime<Utc>,
}

/// Referral approval as delivered by the affiliate platform's webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralApproval {
    /// Referral identifier
    pub referral_id: ReferralId,

    /// Customer email, preferred identity
    #[serde(default)]
    pub customer_email: Option<String>,

    /// Customer platform ID, fallback identity
    #[serde(default)]
    pub customer_id: Option<String>,

    /// Approved commission, as a JSON number or numeric string
    pub commission_amount: serde_json::Value,

    /// Affiliate identifier
    #[serde(default)]
    pub affiliate_id: Option<String>,

    /// Affiliate email
    #[serde(default)]
    pub affiliate_email: Option<String>,
}

impl ReferralApproval {
    /// Build an approval with a decimal commission and email identity
    pub fn new(
        referral_id: impl Into<ReferralId>,
        customer_email: impl Into<String>,
        commission: Decimal,
    ) -> Self {
        Self {
            referral_id: referral_id.into(),
            customer_email: Some(customer_email.into()),
            customer_id: None,
            commission_amount: serde_json::Value::String(commission.to_string()),
            affiliate_id: None,
            affiliate_email: None,
        }
    }

    /// Set affiliate provenance
    pub fn with_affiliate(mut self, id: impl Into<String>, email: impl Into<String>) -> Self {
        self.affiliate_id = Some(id.into());
        self.affiliate_email = Some(email.into());
        self
    }

    /// Derive the customer key: email first, then customer ID
    pub fn customer_key(&self) -> Result<CustomerKey> {
        self.customer_email
            .as_deref()
            .and_then(CustomerKey::email)
            .or_else(|| self.customer_id.as_deref().and_then(CustomerKey::customer_id))
            .ok_or_else(|| {
                Error::InvalidApproval(format!(
                    "referral {} has no usable customer identity",
                    self.referral_id
                ))
            })
    }

    /// Parse the commission as a finite, non-negative decimal
    pub fn commission(&self) -> Result<Decimal> {
        let amount = parse_amount(&self.commission_amount).ok_or_else(|| {
            Error::InvalidApproval(format!(
                "referral {} commission {} is not a number",
                self.referral_id, self.commission_amount
            ))
        })?;

        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(Error::InvalidApproval(format!(
                "referral {} commission {} is negative",
                self.referral_id, amount
            )));
        }

        Ok(amount)
    }
}

fn parse_amount(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Credit taken from one referral during a consumption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Referral debited
    pub referral_id: ReferralId,

    /// Amount debited
    pub used: Decimal,
}

/// Outcome of a successful consumption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumption {
    /// Correlation ID for logs
    pub consumption_id: Uuid,

    /// Customer charged
    pub customer_key: CustomerKey,

    /// Amount the caller asked for
    pub requested: Decimal,

    /// Amount actually debited
    pub used: Decimal,

    /// Per-referral debits, in allocation order
    pub breakdown: Vec<Allocation>,
}

impl Consumption {
    /// Consumption that debited nothing
    pub fn empty(customer_key: CustomerKey, requested: Decimal) -> Self {
        Self {
            consumption_id: Uuid::now_v7(),
            customer_key,
            requested,
            used: Decimal::ZERO,
            breakdown: Vec::new(),
        }
    }

    /// Amount of the request left uncovered
    pub fn shortfall(&self) -> Decimal {
        self.requested - self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_customer_key_normalizes_email() {
        let key = CustomerKey::email("  Jane.Doe@Example.COM ").unwrap();
        assert_eq!(key.as_str(), "jane.doe@example.com");
        assert!(CustomerKey::email("not-an-email").is_none());
        assert!(CustomerKey::email("   ").is_none());
    }

    #[test]
    fn test_referral_id_from_string_or_number() {
        let from_number: ReferralId = serde_json::from_value(json!(4521)).unwrap();
        let from_text: ReferralId = serde_json::from_value(json!("4521")).unwrap();
        assert_eq!(from_number, from_text);
    }

    #[test]
    fn test_referral_id_is_trimmed() {
        assert_eq!(ReferralId::new("  4521 ").as_str(), "4521");
        assert!(ReferralId::new("   ").as_str().is_empty());
        assert_eq!(ReferralId::from(" r1"), ReferralId::new("r1"));
    }

    #[test]
    fn test_with_affiliate_sets_provenance() {
        let approval = ReferralApproval::new("r1", "a@example.com", dec!(5))
            .with_affiliate("aff-9", "partner@example.com");
        assert_eq!(approval.affiliate_id.as_deref(), Some("aff-9"));
        assert_eq!(approval.affiliate_email.as_deref(), Some("partner@example.com"));
    }

    #[test]
    fn test_approval_deserializes_webhook_payload() {
        let approval: ReferralApproval = serde_json::from_value(json!({
            "referral_id": 77,
            "customer_email": "buyer@example.com",
            "commission_amount": "12.50",
            "affiliate_id": "aff-1"
        }))
        .unwrap();

        assert_eq!(approval.referral_id.as_str(), "77");
        assert_eq!(approval.commission().unwrap(), dec!(12.50));
        assert_eq!(approval.customer_key().unwrap().as_str(), "buyer@example.com");
        assert!(approval.affiliate_email.is_none());
    }

    #[test]
    fn test_commission_accepts_json_number() {
        let mut approval = ReferralApproval::new("r1", "a@example.com", Decimal::ZERO);
        approval.commission_amount = json!(19.99);
        assert_eq!(approval.commission().unwrap(), dec!(19.99));
    }

    #[test]
    fn test_commission_rejects_garbage_and_negative() {
        let mut approval = ReferralApproval::new("r1", "a@example.com", Decimal::ZERO);

        approval.commission_amount = json!("twelve");
        assert!(matches!(approval.commission(), Err(Error::InvalidApproval(_))));

        approval.commission_amount = json!("NaN");
        assert!(approval.commission().is_err());

        approval.commission_amount = json!(null);
        assert!(approval.commission().is_err());

        approval.commission_amount = json!("-3.00");
        let err = approval.commission().unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn test_customer_key_falls_back_to_customer_id() {
        let mut approval = ReferralApproval::new("r1", "", dec!(5));
        approval.customer_id = Some("98765".to_string());
        assert_eq!(approval.customer_key().unwrap().as_str(), "customer:98765");

        approval.customer_id = None;
        assert!(approval.customer_key().is_err());
    }
}
