/// Show dataset coverage - rows, date span, exchanges, gaps
/// Usage: cargo run --bin show_volume_status [config.toml]
use std::collections::BTreeMap;

use chrono::Utc;
use perps_volume::config::load_config;
use perps_volume::data::DatasetStore;
use perps_volume::utils::{date_range, yesterday_utc};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("📊 Perps Volume Dataset Status");
    println!("==============================\n");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = load_config(&config_path)?;

    let store = DatasetStore::new(config.store_path.clone());
    if !store.path().exists() {
        println!("❌ No dataset found at {}", store.path().display());
        println!("\n💡 To backfill, run:");
        println!("   cargo run --release");
        return Ok(());
    }

    let dataset = store.load().await?;
    if dataset.is_empty() {
        println!("⚠️  Dataset is empty");
        return Ok(());
    }

    let dates = dataset.dates();
    println!("📈 Summary:");
    println!("   Rows: {}", dataset.len());
    if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
        println!("   Dates: {} → {} ({} distinct)", first, last, dates.len());
    }
    println!("   Exchanges: {}", dataset.exchanges().len());

    // Rows per exchange
    let mut per_exchange: BTreeMap<&str, usize> = BTreeMap::new();
    for row in dataset.rows() {
        *per_exchange.entry(row.exchange.as_str()).or_default() += 1;
    }
    println!("\n🏦 Rows per exchange:");
    for (exchange, count) in &per_exchange {
        println!("   {:<24} {} rows", exchange, count);
    }

    // Total USD per token
    let mut per_token: BTreeMap<&str, f64> = BTreeMap::new();
    let mut grand_total = 0.0;
    for row in dataset.rows() {
        for (token, volume) in &row.volumes {
            *per_token.entry(token.as_str()).or_default() += volume;
        }
        grand_total += row.total;
    }
    println!("\n💵 Volume by token (USD):");
    for (token, volume) in &per_token {
        println!("   {:<6} {:>24.2}", token, volume);
    }
    println!("   {:<6} {:>24.2}", "Total", grand_total);

    // Days with no row at all
    let expected = date_range(config.start_date, yesterday_utc(Utc::now()));
    let gaps: Vec<_> = expected.iter().filter(|d| !dates.contains(*d)).collect();
    println!("\n🕳️  Days without any row: {}", gaps.len());
    for day in gaps.iter().take(10) {
        println!("   - {}", day);
    }
    if gaps.len() > 10 {
        println!("   ... and {} more", gaps.len() - 10);
    }

    println!("\n✅ Status check complete!");

    Ok(())
}
