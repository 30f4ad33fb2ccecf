/// Daily per-exchange, per-token USD volume aggregation
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::VolumeError;
use crate::types::{DailyVolumes, MarketRef, VolumeRow};
use crate::upstream::MarketDataSource;
use crate::utils::{DayWindow, RequestPacer};

/// Result of aggregating one calendar day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub volumes: DailyVolumes,
    pub markets_queried: usize,
    pub failed_symbols: Vec<String>,
    pub candles_skipped: usize,
}

impl DailyAggregate {
    fn empty(date: NaiveDate) -> Self {
        DailyAggregate {
            date,
            volumes: BTreeMap::new(),
            markets_queried: 0,
            failed_symbols: Vec::new(),
            candles_skipped: 0,
        }
    }

    /// One row per exchange that produced at least one observation
    pub fn to_rows(&self, tokens: &[String]) -> Vec<VolumeRow> {
        self.volumes
            .iter()
            .map(|(exchange, token_volumes)| {
                VolumeRow::from_token_volumes(self.date, exchange, tokens, token_volumes)
            })
            .collect()
    }
}

pub struct VolumeAggregator {
    source: Arc<dyn MarketDataSource>,
    pacer: RequestPacer,
    tokens: Vec<String>,
}

impl VolumeAggregator {
    pub fn new(source: Arc<dyn MarketDataSource>, pacer: RequestPacer, tokens: Vec<String>) -> Self {
        VolumeAggregator {
            source,
            pacer,
            tokens,
        }
    }

    /// Sum `volume × close` per (exchange, token) for `date`.
    ///
    /// Markets are queried one at a time behind the pacer. A failed market is
    /// skipped for this date only; incomplete candles are skipped silently.
    pub async fn aggregate(&self, date: NaiveDate, markets: &[MarketRef]) -> DailyAggregate {
        let window = DayWindow::for_date(date);
        let mut aggregate = DailyAggregate::empty(date);

        for market in markets {
            self.pacer.pace().await;
            aggregate.markets_queried += 1;

            let candles = match self.source.ohlcv_history(&market.symbol, window).await {
                Ok(candles) => candles,
                Err(e) => {
                    let recoverable = e.is_recoverable();
                    let failure = VolumeError::MarketFetchFailed {
                        symbol: market.symbol.clone(),
                        date: date.to_string(),
                        message: e.to_string(),
                    };
                    if recoverable {
                        warn!("⚠️  {} - skipping", failure);
                    } else {
                        error!("❌ {} - skipping", failure);
                    }
                    aggregate.failed_symbols.push(market.symbol.clone());
                    continue;
                }
            };

            for candle in candles {
                if !window.contains(candle.t) {
                    debug!(
                        "Skipping {} candle at {} outside {}",
                        market.symbol, candle.t, date
                    );
                    aggregate.candles_skipped += 1;
                    continue;
                }

                let Some(usd) = candle.usd_volume() else {
                    let malformed = VolumeError::MalformedCandle(format!(
                        "{} at {} lacks volume or close",
                        market.symbol, candle.t
                    ));
                    debug!("{}", malformed);
                    aggregate.candles_skipped += 1;
                    continue;
                };

                let per_token = aggregate
                    .volumes
                    .entry(market.exchange.clone())
                    .or_insert_with(|| self.tokens.iter().map(|t| (t.clone(), 0.0)).collect());
                *per_token.entry(market.token.clone()).or_insert(0.0) += usd;
            }
        }

        aggregate
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Candle;
    use crate::upstream::mock::{candle, MockSource};
    use std::time::Duration;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn market(exchange: &str, symbol: &str, token: &str) -> MarketRef {
        MarketRef {
            exchange_code: exchange.to_string(),
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            token: token.to_string(),
        }
    }

    fn aggregator(source: MockSource) -> VolumeAggregator {
        VolumeAggregator::new(
            Arc::new(source),
            RequestPacer::new(Duration::ZERO),
            vec!["BTC".to_string(), "ETH".to_string()],
        )
    }

    #[tokio::test]
    async fn test_sums_contract_variants_per_exchange() {
        let source = MockSource::new()
            .with_candles("BTCUSDT_PERP.A", date(), vec![candle(date(), 50_000.0, 2.0)])
            .with_candles("BTCUSD_PERP.A", date(), vec![candle(date(), 50_000.0, 1.0)])
            .with_candles("ETHUSDT_PERP.A", date(), vec![candle(date(), 3_000.0, 10.0)]);
        let markets = vec![
            market("Alpha", "BTCUSDT_PERP.A", "BTC"),
            market("Alpha", "BTCUSD_PERP.A", "BTC"),
            market("Alpha", "ETHUSDT_PERP.A", "ETH"),
        ];

        let aggregate = aggregator(source).aggregate(date(), &markets).await;

        let alpha = &aggregate.volumes["Alpha"];
        assert_eq!(alpha["BTC"], 150_000.0);
        assert_eq!(alpha["ETH"], 30_000.0);
        assert_eq!(aggregate.markets_queried, 3);
        assert!(aggregate.failed_symbols.is_empty());
    }

    #[tokio::test]
    async fn test_every_token_present_for_observed_exchange() {
        let source = MockSource::new().with_usd_volume("ETHUSDT_PERP.B", date(), 42.0);
        let markets = vec![
            market("Beta", "ETHUSDT_PERP.B", "ETH"),
            market("Gamma", "BTCUSDT_PERP.G", "BTC"),
        ];

        let aggregate = aggregator(source).aggregate(date(), &markets).await;

        // Gamma returned nothing, so it gets no entry at all
        assert_eq!(aggregate.volumes.len(), 1);
        let beta = &aggregate.volumes["Beta"];
        assert_eq!(beta["BTC"], 0.0);
        assert_eq!(beta["ETH"], 42.0);

        let rows = aggregate.to_rows(&["BTC".to_string(), "ETH".to_string()]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total, 42.0);
    }

    #[tokio::test]
    async fn test_failing_market_does_not_affect_others() {
        let source = MockSource::new()
            .with_usd_volume("BTCUSDT_PERP.A", date(), 100.0)
            .with_usd_volume("ETHUSDT_PERP.A", date(), 50.0)
            .failing_symbol("BTCUSD_PERP.A");
        let markets = vec![
            market("Alpha", "BTCUSDT_PERP.A", "BTC"),
            market("Alpha", "BTCUSD_PERP.A", "BTC"),
            market("Alpha", "ETHUSDT_PERP.A", "ETH"),
        ];

        let aggregate = aggregator(source).aggregate(date(), &markets).await;

        assert_eq!(aggregate.failed_symbols, vec!["BTCUSD_PERP.A".to_string()]);
        assert_eq!(aggregate.volumes["Alpha"]["BTC"], 100.0);
        assert_eq!(aggregate.volumes["Alpha"]["ETH"], 50.0);
    }

    #[tokio::test]
    async fn test_incomplete_and_out_of_window_candles_skipped() {
        let next_day = date().succ_opt().unwrap();
        let no_close = Candle {
            c: None,
            ..candle(date(), 1.0, 500.0)
        };
        let no_volume = Candle {
            v: None,
            ..candle(date(), 1.0, 500.0)
        };
        let source = MockSource::new().with_candles(
            "BTCUSDT_PERP.A",
            date(),
            vec![
                candle(date(), 2.0, 5.0),
                no_close,
                no_volume,
                candle(next_day, 2.0, 1_000.0),
            ],
        );
        let markets = vec![market("Alpha", "BTCUSDT_PERP.A", "BTC")];

        let aggregate = aggregator(source).aggregate(date(), &markets).await;

        assert_eq!(aggregate.volumes["Alpha"]["BTC"], 10.0);
        assert_eq!(aggregate.candles_skipped, 3);
    }

    #[tokio::test]
    async fn test_only_malformed_candles_produce_no_exchange() {
        let source = MockSource::new().with_candles(
            "BTCUSDT_PERP.A",
            date(),
            vec![Candle {
                t: DayWindow::for_date(date()).from,
                ..Default::default()
            }],
        );
        let markets = vec![market("Alpha", "BTCUSDT_PERP.A", "BTC")];

        let aggregate = aggregator(source).aggregate(date(), &markets).await;

        assert!(aggregate.volumes.is_empty());
        assert!(aggregate.to_rows(&["BTC".to_string()]).is_empty());
    }
}
