pub mod coinalyze;
pub mod market_catalog;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Candle, ExchangeInfo, FutureMarket};
use crate::utils::DayWindow;

pub use coinalyze::CoinalyzeClient;
pub use market_catalog::{resolve_markets, MarketCatalogResolver};

/// Market-data endpoints the backfill consumes
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Full futures market listing
    async fn future_markets(&self) -> Result<Vec<FutureMarket>>;

    /// Exchange code to display name listing
    async fn exchanges(&self) -> Result<Vec<ExchangeInfo>>;

    /// Daily candles for one symbol inside `window`; empty is a valid answer
    async fn ohlcv_history(&self, symbol: &str, window: DayWindow) -> Result<Vec<Candle>>;
}
