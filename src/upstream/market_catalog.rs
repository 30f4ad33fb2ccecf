/// Market catalog resolution: which perpetual markets feed the dataset
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, VolumeError};
use crate::types::{ExchangeInfo, FutureMarket, MarketRef};
use crate::upstream::MarketDataSource;

pub struct MarketCatalogResolver {
    source: Arc<dyn MarketDataSource>,
}

impl MarketCatalogResolver {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        MarketCatalogResolver { source }
    }

    /// Resolve every perpetual market whose base asset is one of `target_tokens`.
    ///
    /// Either listing failing is `UpstreamUnavailable`: a partial catalog would
    /// silently under-count volume.
    pub async fn resolve(&self, target_tokens: &[String]) -> Result<Vec<MarketRef>> {
        info!("📥 Downloading futures market and exchange listings...");

        let markets = self.source.future_markets().await.map_err(|e| {
            VolumeError::UpstreamUnavailable(format!("future-markets listing failed: {}", e))
        })?;

        let exchanges = self.source.exchanges().await.map_err(|e| {
            VolumeError::UpstreamUnavailable(format!("exchanges listing failed: {}", e))
        })?;

        let resolved = resolve_markets(&markets, &exchanges, target_tokens);

        info!(
            "✅ Resolved {} perpetual markets for {:?} ({} listed, {} exchanges)",
            resolved.len(),
            target_tokens,
            markets.len(),
            exchanges.len()
        );

        Ok(resolved)
    }
}

/// Filter and label markets; exchange codes without a listing keep the raw code as name
pub fn resolve_markets(
    markets: &[FutureMarket],
    exchanges: &[ExchangeInfo],
    target_tokens: &[String],
) -> Vec<MarketRef> {
    let names: HashMap<&str, &str> = exchanges
        .iter()
        .map(|e| (e.code.as_str(), e.name.as_str()))
        .collect();

    markets
        .iter()
        .filter(|m| m.is_perpetual)
        .filter_map(|m| {
            let base = m.base_asset.as_deref()?;
            let token = target_tokens
                .iter()
                .find(|t| t.eq_ignore_ascii_case(base))?;

            let exchange = names
                .get(m.exchange.as_str())
                .copied()
                .unwrap_or_else(|| {
                    debug!("No exchange name for code {}, using raw code", m.exchange);
                    m.exchange.as_str()
                });

            Some(MarketRef {
                exchange_code: m.exchange.clone(),
                exchange: exchange.to_string(),
                symbol: m.symbol.clone(),
                token: token.clone(),
            })
        })
        .collect()
}
