/// Backfill missing daily perpetual-futures volume rows
/// Usage: perps-volume [config.toml]
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use perps_volume::{
    config::load_config,
    data::{BackfillDriver, BackfillOutcome},
    upstream::CoinalyzeClient,
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .init();

    info!("🚀 Perpetual futures volume backfill");
    info!("   Tokens: {:?}", config.tokens());
    info!("   Store: {}", config.store_path.display());

    let client = CoinalyzeClient::from_config(&config)?;
    let driver = BackfillDriver::new(Arc::new(config), Arc::new(client));

    match driver.run().await {
        Ok(report) => {
            match report.outcome {
                BackfillOutcome::UpToDate => info!("✅ No missing dates. Up to date."),
                BackfillOutcome::NoNewData => info!(
                    "✅ Checked {} dates, no new volume reported",
                    report.dates_processed.len()
                ),
                BackfillOutcome::Appended => info!(
                    "✅ Appended {} rows for {} dates ({} → {})",
                    report.rows_appended,
                    report.dates_appended.len(),
                    report.dates_appended.first().map(|d| d.to_string()).unwrap_or_default(),
                    report.dates_appended.last().map(|d| d.to_string()).unwrap_or_default()
                ),
            }
            if !report.market_failures.is_empty() {
                warn!("⚠️  {} market fetches were skipped:", report.market_failures.len());
                for failure in report.market_failures.iter().take(10) {
                    warn!("      - {}", failure);
                }
            }
            Ok(())
        }
        Err(e) => {
            error!("❌ Backfill aborted [{}]: {}", e.error_code(), e);
            Err(e.into())
        }
    }
}
