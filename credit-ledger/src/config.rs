//! Configuration for the credit ledger

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Referral platform sync
    pub sync: SyncConfig,

    /// Allocation behaviour
    pub allocation: AllocationConfig,

    /// Duplicate delivery guard
    pub idempotency: IdempotencyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "credit-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            sync: SyncConfig::default(),
            allocation: AllocationConfig::default(),
            idempotency: IdempotencyConfig::default(),
        }
    }
}

/// Referral platform sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// API root, e.g. `https://api.referrals.example/1.6`
    pub base_url: String,

    /// API key sent as `X-Api-Key`
    pub api_key: String,

    /// Bound on a single adjustment call (milliseconds)
    pub timeout_ms: u64,

    /// Currency code sent with adjustments
    pub currency: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_ms: 5_000,
            currency: "USD".to_string(),
        }
    }
}

impl SyncConfig {
    /// Timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// What happens to earlier debits when a later sync fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Earlier debits stand and are reported as committed
    #[default]
    PartialCommit,

    /// Earlier debits are reversed on the platform and restored locally
    Compensate,
}

impl FromStr for RollbackPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "partial_commit" | "partial" => Ok(RollbackPolicy::PartialCommit),
            "compensate" | "full" => Ok(RollbackPolicy::Compensate),
            other => Err(crate::Error::Config(format!(
                "Unknown rollback policy: {}",
                other
            ))),
        }
    }
}

/// Allocation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Handling of earlier debits on sync failure
    pub rollback_policy: RollbackPolicy,
}

/// Idempotency guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// How long a delivered event id is remembered (seconds)
    pub ttl_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400, // 24 hours
        }
    }
}

impl IdempotencyConfig {
    /// Retention as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let mut config = Config::default();

        if let Some(url) = lookup("CREDIT_LEDGER_SYNC_BASE_URL") {
            config.sync.base_url = url;
        }

        if let Some(key) = lookup("CREDIT_LEDGER_SYNC_API_KEY") {
            config.sync.api_key = key;
        }

        if let Some(ms) = lookup("CREDIT_LEDGER_SYNC_TIMEOUT_MS") {
            config.sync.timeout_ms = ms.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid CREDIT_LEDGER_SYNC_TIMEOUT_MS: {}", e))
            })?;
        }

        if let Some(policy) = lookup("CREDIT_LEDGER_ROLLBACK_POLICY") {
            config.allocation.rollback_policy = policy.parse()?;
        }

        if let Some(ttl) = lookup("CREDIT_LEDGER_IDEMPOTENCY_TTL_SECS") {
            config.idempotency.ttl_secs = ttl.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid CREDIT_LEDGER_IDEMPOTENCY_TTL_SECS: {}", e))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "credit-ledger");
        assert_eq!(config.service_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.sync.timeout(), Duration::from_secs(5));
        assert_eq!(config.allocation.rollback_policy, RollbackPolicy::PartialCommit);
    }

    #[test]
    fn test_from_file_fills_missing_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[sync]
base_url = "https://referrals.example/api"
timeout_ms = 750

[allocation]
rollback_policy = "compensate"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.sync.base_url, "https://referrals.example/api");
        assert_eq!(config.sync.timeout_ms, 750);
        assert_eq!(config.sync.currency, "USD");
        assert_eq!(config.allocation.rollback_policy, RollbackPolicy::Compensate);
        assert_eq!(config.idempotency.ttl_secs, 86_400);
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sync\nbase_url = ").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CREDIT_LEDGER_SYNC_BASE_URL", "http://localhost:9000"),
            ("CREDIT_LEDGER_SYNC_TIMEOUT_MS", "250"),
            ("CREDIT_LEDGER_ROLLBACK_POLICY", "Compensate"),
            ("CREDIT_LEDGER_IDEMPOTENCY_TTL_SECS", "600"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.sync.base_url, "http://localhost:9000");
        assert_eq!(config.sync.timeout_ms, 250);
        assert_eq!(config.allocation.rollback_policy, RollbackPolicy::Compensate);
        assert_eq!(config.idempotency.ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let bad_timeout = Config::from_lookup(|k| {
            (k == "CREDIT_LEDGER_SYNC_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(bad_timeout.is_err());

        let bad_policy = Config::from_lookup(|k| {
            (k == "CREDIT_LEDGER_ROLLBACK_POLICY").then(|| "yolo".to_string())
        });
        assert!(bad_policy.is_err());
    }
}
