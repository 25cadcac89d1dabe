//! Credit ledger server binary

use anyhow::Context;
use credit_ledger::{Config, CreditLedger, HttpCommissionSync, ProcessedEvents};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting credit ledger");

    // Load configuration
    let config = match std::env::var("CREDIT_LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        Err(_) => Config::from_env().context("loading config from environment")?,
    };

    let events = ProcessedEvents::from_config(&config.idempotency);
    info!(ttl_secs = events.ttl().as_secs(), "Duplicate delivery guard ready");

    let sync = HttpCommissionSync::new(config.sync.clone())
        .context("building referral platform client")?;
    let ledger = Arc::new(CreditLedger::new(config, Arc::new(sync))?);
    info!(?ledger, "Ledger ready");

    // Webhook handlers attach to `ledger` here, checking `events` first.
    tokio::signal::ctrl_c().await?;

    info!(
        records = ledger.record_count(),
        customers = ledger.customer_count(),
        events = events.len(),
        "Shutting down credit ledger"
    );
    Ok(())
}
