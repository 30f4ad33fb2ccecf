/// Coinalyze REST client
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Result, VolumeError};
use crate::types::{BackfillConfig, Candle, ExchangeInfo, FutureMarket};
use crate::upstream::MarketDataSource;
use crate::utils::DayWindow;

/// Wait applied when a 429 carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER_SECS: f64 = 5.0;

/// 429 retries allowed for a single request, whatever the signaled waits add up to
const MAX_RATE_LIMIT_RETRIES: u32 = 8;

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    history: Vec<Candle>,
}

/// Coinalyze API client
pub struct CoinalyzeClient {
    client: Client,
    base_url: String,
    api_key: String,
    max_retry_wait: Duration,
    min_retry_wait: Duration,
}

impl CoinalyzeClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        max_retry_wait: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(CoinalyzeClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retry_wait,
            min_retry_wait: Duration::ZERO,
        })
    }

    /// Floor applied to every 429 wait, so retries never outrun the request pacing
    pub fn with_min_retry_wait(mut self, min_retry_wait: Duration) -> Self {
        self.min_retry_wait = min_retry_wait;
        self
    }

    /// Build a client from config, reading the API key from the configured env var
    pub fn from_config(config: &BackfillConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                VolumeError::ConfigError(format!("{} is not set", config.api_key_env))
            })?;

        Ok(Self::new(
            config.api_base_url.clone(),
            api_key,
            config.request_timeout(),
            config.max_retry_wait(),
        )?
        .with_min_retry_wait(config.request_delay()))
    }

    /// GET `path` and decode the JSON body.
    ///
    /// A 429 is retried with the identical request after the signaled delay (never less
    /// than `min_retry_wait`) until the cumulative wait would exceed `max_retry_wait` or
    /// `MAX_RATE_LIMIT_RETRIES` retries have been spent.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        let mut waited = Duration::ZERO;
        let mut retries = 0u32;

        loop {
            let response = self
                .client
                .get(&url)
                .header("api_key", &self.api_key)
                .header("Accept", "application/json")
                .query(query)
                .send()
                .await?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(response.headers()).max(self.min_retry_wait);
                let over_budget = waited
                    .checked_add(wait)
                    .map_or(true, |total| total > self.max_retry_wait);
                if over_budget || retries >= MAX_RATE_LIMIT_RETRIES {
                    return Err(VolumeError::RateLimitExceeded(format!(
                        "{} still limited after {} retries and {:.1}s",
                        path,
                        retries,
                        waited.as_secs_f64()
                    )));
                }

                let limited = VolumeError::RateLimited {
                    retry_after_secs: wait.as_secs_f64(),
                };
                warn!("⏳ {} ({})", limited, path);
                tokio::time::sleep(wait).await;
                waited += wait;
                retries += 1;
                continue;
            }

            let body = response.text().await?;

            if !status.is_success() {
                let mut message = body;
                if message.len() > MAX_ERROR_BODY {
                    let mut cut = MAX_ERROR_BODY;
                    while !message.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    message.truncate(cut);
                }
                return Err(VolumeError::UpstreamApiError {
                    status: status.as_u16(),
                    message,
                });
            }

            debug!("GET {} -> {} ({} bytes)", path, status, body.len());
            return Ok(serde_json::from_str(&body)?);
        }
    }
}

/// Parse `Retry-After` as (possibly fractional) seconds.
/// Values too large for a `Duration` saturate to `Duration::MAX`.
pub(crate) fn retry_after(headers: &HeaderMap) -> Duration {
    let secs = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[async_trait]
impl MarketDataSource for CoinalyzeClient {
    async fn future_markets(&self) -> Result<Vec<FutureMarket>> {
        self.get_json("future-markets", &[]).await
    }

    async fn exchanges(&self) -> Result<Vec<ExchangeInfo>> {
        self.get_json("exchanges", &[]).await
    }

    async fn ohlcv_history(&self, symbol: &str, window: DayWindow) -> Result<Vec<Candle>> {
        let query = [
            ("symbols", symbol.to_string()),
            ("interval", "daily".to_string()),
            ("from", window.from.to_string()),
            ("to", window.to.to_string()),
        ];

        let responses: Vec<HistoryResponse> = self.get_json("ohlcv-history", &query).await?;

        Ok(responses
            .into_iter()
            .find(|r| r.symbol.is_empty() || r.symbol == symbol)
            .map(|r| r.history)
            .unwrap_or_default())
    }
}
