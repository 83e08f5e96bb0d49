//! Volta ledger server binary

use anyhow::Context;
use std::sync::Arc;
use volta_ledger::{Config, Ledger, LedgerService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("VOLTA_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("Failed to load config from environment")?,
    };

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        data_dir = %config.data_dir.display(),
        "Starting Volta ledger"
    );

    // Open ledger, bootstrapping an empty chain
    let ledger = tokio::task::spawn_blocking(move || Ledger::open(config))
        .await
        .context("Ledger open task failed")?
        .context("Failed to open ledger")?;
    let service = LedgerService::new(Arc::new(ledger));

    let height = service
        .ledger()
        .chain_head()?
        .map(|record| record.id)
        .unwrap_or(0);
    let admin = service.ledger().admin_address()?;
    tracing::info!(
        height,
        admin = ?admin.as_ref().map(|a| a.as_str()),
        listen_addr = %service.ledger().config().listen_addr,
        "Ledger ready"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down Volta ledger");
    Ok(())
}
