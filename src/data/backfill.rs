/// Incremental backfill of the daily perpetual-futures volume dataset.
/// Plans the missing (date, exchange) keys, aggregates only those, and commits once.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::data::{DatasetStore, VolumeAggregator};
use crate::error::Result;
use crate::types::{BackfillConfig, KeyIndex, MarketRef, RowKey, VolumeRow};
use crate::upstream::{MarketCatalogResolver, MarketDataSource};
use crate::utils::{date_range, yesterday_utc, RequestPacer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackfillOutcome {
    /// Nothing was missing; no market data was requested
    UpToDate,
    /// Missing keys were queried but no exchange reported volume for them
    NoNewData,
    /// New rows were committed
    Appended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillReport {
    pub timestamp: DateTime<Utc>,
    pub outcome: BackfillOutcome,
    pub rows_appended: usize,
    pub dates_processed: Vec<NaiveDate>,
    pub dates_appended: Vec<NaiveDate>,
    pub missing_keys: usize,
    pub markets_queried: usize,
    pub market_failures: Vec<String>,
    pub candles_skipped: usize,
    pub duration_ms: u64,
}

impl BackfillReport {
    fn new(timestamp: DateTime<Utc>) -> Self {
        BackfillReport {
            timestamp,
            outcome: BackfillOutcome::UpToDate,
            rows_appended: 0,
            dates_processed: Vec::new(),
            dates_appended: Vec::new(),
            missing_keys: 0,
            markets_queried: 0,
            market_failures: Vec::new(),
            candles_skipped: 0,
            duration_ms: 0,
        }
    }
}

/// Missing exchanges per date, chronological
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillPlan {
    pub work: BTreeMap<NaiveDate, BTreeSet<String>>,
}

impl BackfillPlan {
    /// `dates × exchanges` minus what the store already holds
    pub fn build(dates: &[NaiveDate], exchanges: &BTreeSet<String>, existing: &KeyIndex) -> Self {
        let mut work = BTreeMap::new();

        for date in dates {
            let missing: BTreeSet<String> = exchanges
                .iter()
                .filter(|exchange| !existing.contains(&RowKey::new(*date, exchange.as_str())))
                .cloned()
                .collect();

            if !missing.is_empty() {
                work.insert(*date, missing);
            }
        }

        BackfillPlan { work }
    }

    pub fn is_empty(&self) -> bool {
        self.work.is_empty()
    }

    pub fn missing_keys(&self) -> usize {
        self.work.values().map(|exchanges| exchanges.len()).sum()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.work.keys().copied().collect()
    }

    /// Markets listed on an exchange still missing for `date`
    pub fn markets_for(&self, date: NaiveDate, markets: &[MarketRef]) -> Vec<MarketRef> {
        match self.work.get(&date) {
            Some(missing) => markets
                .iter()
                .filter(|m| missing.contains(&m.exchange))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}

pub struct BackfillDriver {
    config: Arc<BackfillConfig>,
    tokens: Vec<String>,
    resolver: MarketCatalogResolver,
    aggregator: VolumeAggregator,
    store: DatasetStore,
}

impl BackfillDriver {
    pub fn new(config: Arc<BackfillConfig>, source: Arc<dyn MarketDataSource>) -> Self {
        let tokens = config.tokens();
        let pacer = RequestPacer::new(config.request_delay());

        Self {
            resolver: MarketCatalogResolver::new(Arc::clone(&source)),
            aggregator: VolumeAggregator::new(source, pacer, tokens.clone()),
            store: DatasetStore::new(config.store_path.clone()),
            tokens,
            config,
        }
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Backfill everything from the start date through yesterday (UTC)
    pub async fn run(&self) -> Result<BackfillReport> {
        self.run_at(Utc::now()).await
    }

    /// Backfill as if the current time were `now`
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<BackfillReport> {
        let started = Instant::now();
        let mut report = BackfillReport::new(now);

        // Plan
        let existing = self.store.existing_keys().await?;
        let last_day = yesterday_utc(now);
        let all_dates = date_range(self.config.start_date, last_day);

        info!(
            "📊 Backfill {} → {} ({} days, {} rows on disk)",
            self.config.start_date,
            last_day,
            all_dates.len(),
            existing.len()
        );

        if all_dates.is_empty() {
            info!("✅ No closed days since {}. Up to date.", self.config.start_date);
            return Ok(self.finish(report, started).await);
        }

        let markets = self.resolver.resolve(&self.tokens).await?;
        if markets.is_empty() {
            warn!("⚠️  No perpetual markets listed for {:?}", self.tokens);
        }

        let exchanges: BTreeSet<String> = markets.iter().map(|m| m.exchange.clone()).collect();
        let plan = BackfillPlan::build(&all_dates, &exchanges, &existing);

        if plan.is_empty() {
            info!("✅ No missing (date, exchange) pairs. Up to date.");
            return Ok(self.finish(report, started).await);
        }

        report.missing_keys = plan.missing_keys();
        info!(
            "🎯 {} missing (date, exchange) pairs across {} dates",
            report.missing_keys,
            plan.work.len()
        );

        // Execute
        let new_rows = self.execute(&plan, &markets, &mut report).await;

        // Commit
        let outcome = self.store.merge(&new_rows).await?;
        report.rows_appended = outcome.appended;
        report.dates_appended = new_rows
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        report.outcome = if outcome.appended > 0 {
            BackfillOutcome::Appended
        } else {
            BackfillOutcome::NoNewData
        };

        info!(
            "✅ Appended {} rows for dates: {:?}",
            report.rows_appended,
            report
                .dates_appended
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
        );
        if !report.market_failures.is_empty() {
            warn!("   Market fetches skipped: {}", report.market_failures.len());
        }

        Ok(self.finish(report, started).await)
    }

    /// Aggregate every planned date in order; rows are only kept in memory
    async fn execute(
        &self,
        plan: &BackfillPlan,
        markets: &[MarketRef],
        report: &mut BackfillReport,
    ) -> Vec<VolumeRow> {
        let mut new_rows = Vec::new();
        let total = plan.work.len();

        for (idx, (date, missing)) in plan.work.iter().enumerate() {
            let day_markets = plan.markets_for(*date, markets);
            info!(
                "   [{}/{}] {} - {} markets on {} exchanges",
                idx + 1,
                total,
                date,
                day_markets.len(),
                missing.len()
            );

            let aggregate = self.aggregator.aggregate(*date, &day_markets).await;

            report.dates_processed.push(*date);
            report.markets_queried += aggregate.markets_queried;
            report.candles_skipped += aggregate.candles_skipped;
            report.market_failures.extend(
                aggregate
                    .failed_symbols
                    .iter()
                    .map(|symbol| format!("{} {}", date, symbol)),
            );

            new_rows.extend(
                aggregate
                    .to_rows(self.aggregator.tokens())
                    .into_iter()
                    .filter(|row| missing.contains(&row.exchange)),
            );
        }

        new_rows
    }

    async fn finish(&self, mut report: BackfillReport, started: Instant) -> BackfillReport {
        report.duration_ms = started.elapsed().as_millis() as u64;

        if let Some(path) = &self.config.report_path {
            if let Err(e) = save_report(path, &report).await {
                error!("❌ Failed to save backfill report to {}: {}", path.display(), e);
            }
        }

        report
    }
}

/// Save the run report as pretty JSON
async fn save_report(path: &std::path::Path, report: &BackfillReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(path, json).await?;

    info!("💾 Saved backfill report to {}", path.display());
    Ok(())
}
