/// In-memory market-data source for tests
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Result, VolumeError};
use crate::types::{Candle, ExchangeInfo, FutureMarket};
use crate::upstream::MarketDataSource;
use crate::utils::DayWindow;

pub fn perp(symbol: &str, exchange_code: &str, base: &str) -> FutureMarket {
    FutureMarket {
        symbol: symbol.to_string(),
        exchange: exchange_code.to_string(),
        base_asset: Some(base.to_string()),
        quote_asset: Some("USDT".to_string()),
        is_perpetual: true,
    }
}

pub fn exchange(code: &str, name: &str) -> ExchangeInfo {
    ExchangeInfo {
        code: code.to_string(),
        name: name.to_string(),
    }
}

/// Daily candle opening at `date` midnight
pub fn candle(date: NaiveDate, close: f64, volume: f64) -> Candle {
    Candle {
        t: DayWindow::for_date(date).from,
        o: Some(close),
        h: Some(close),
        l: Some(close),
        c: Some(close),
        v: Some(volume),
    }
}

#[derive(Default)]
pub struct MockSource {
    markets: Vec<FutureMarket>,
    exchanges: Vec<ExchangeInfo>,
    candles: HashMap<(String, NaiveDate), Vec<Candle>>,
    failing_symbols: HashSet<String>,
    fail_listings: bool,
    history_calls: Mutex<Vec<(String, NaiveDate)>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_market(mut self, market: FutureMarket) -> Self {
        self.markets.push(market);
        self
    }

    pub fn with_exchange(mut self, code: &str, name: &str) -> Self {
        self.exchanges.push(exchange(code, name));
        self
    }

    pub fn with_candles(mut self, symbol: &str, date: NaiveDate, candles: Vec<Candle>) -> Self {
        self.candles
            .entry((symbol.to_string(), date))
            .or_default()
            .extend(candles);
        self
    }

    /// One candle worth `usd` (close 1.0, volume `usd`)
    pub fn with_usd_volume(self, symbol: &str, date: NaiveDate, usd: f64) -> Self {
        self.with_candles(symbol, date, vec![candle(date, 1.0, usd)])
    }

    pub fn failing_symbol(mut self, symbol: &str) -> Self {
        self.failing_symbols.insert(symbol.to_string());
        self
    }

    pub fn failing_listings(mut self) -> Self {
        self.fail_listings = true;
        self
    }

    pub fn history_calls(&self) -> Vec<(String, NaiveDate)> {
        self.history_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataSource for MockSource {
    async fn future_markets(&self) -> Result<Vec<FutureMarket>> {
        if self.fail_listings {
            return Err(VolumeError::UpstreamApiError {
                status: 503,
                message: "listing down".to_string(),
            });
        }
        Ok(self.markets.clone())
    }

    async fn exchanges(&self) -> Result<Vec<ExchangeInfo>> {
        if self.fail_listings {
            return Err(VolumeError::UpstreamApiError {
                status: 503,
                message: "listing down".to_string(),
            });
        }
        Ok(self.exchanges.clone())
    }

    async fn ohlcv_history(&self, symbol: &str, window: DayWindow) -> Result<Vec<Candle>> {
        self.history_calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), window.date));

        if self.failing_symbols.contains(symbol) {
            return Err(VolumeError::UpstreamApiError {
                status: 500,
                message: format!("no history for {}", symbol),
            });
        }

        Ok(self
            .candles
            .get(&(symbol.to_string(), window.date))
            .cloned()
            .unwrap_or_default())
    }
}
