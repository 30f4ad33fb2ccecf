/// Core type definitions for the perpetual-futures volume dataset
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Decimal places kept for every persisted USD figure
pub const VOLUME_DECIMALS: i32 = 2;

/// Futures market entry from the upstream market listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FutureMarket {
    pub symbol: String,
    pub exchange: String,
    #[serde(default)]
    pub base_asset: Option<String>,
    #[serde(default)]
    pub quote_asset: Option<String>,
    #[serde(default)]
    pub is_perpetual: bool,
}

/// Exchange entry from the upstream exchange listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeInfo {
    pub code: String,
    pub name: String,
}

/// Daily OHLCV candle as returned by the history endpoint.
/// Every price/volume field is optional; incomplete candles are skipped downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candle {
    /// Open time, unix seconds
    pub t: i64,
    #[serde(default)]
    pub o: Option<f64>,
    #[serde(default)]
    pub h: Option<f64>,
    #[serde(default)]
    pub l: Option<f64>,
    #[serde(default)]
    pub c: Option<f64>,
    #[serde(default)]
    pub v: Option<f64>,
}

impl Candle {
    /// USD volume proxy: traded quantity times close price.
    /// `None` when either field is missing.
    pub fn usd_volume(&self) -> Option<f64> {
        match (self.v, self.c) {
            (Some(volume), Some(close)) if volume.is_finite() && close.is_finite() => {
                Some(volume * close)
            }
            _ => None,
        }
    }
}

/// A perpetual market we track, resolved once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketRef {
    pub exchange_code: String,
    pub exchange: String,
    pub symbol: String,
    pub token: String,
}

/// Per-exchange, per-token USD volume for one day
pub type DailyVolumes = BTreeMap<String, BTreeMap<String, f64>>;

/// De-duplication key of a persisted row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub date: NaiveDate,
    pub exchange: String,
}

impl RowKey {
    pub fn new(date: NaiveDate, exchange: impl Into<String>) -> Self {
        RowKey {
            date,
            exchange: exchange.into(),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.date, self.exchange)
    }
}

pub type KeyIndex = HashSet<RowKey>;

/// One persisted observation: `{Date, Exchange, <token>..., Total}`
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRow {
    pub date: NaiveDate,
    pub exchange: String,
    /// Token columns in configured order
    pub volumes: Vec<(String, f64)>,
    pub total: f64,
}

impl VolumeRow {
    /// Build a row with one column per configured token (missing ones default to 0)
    pub fn from_token_volumes(
        date: NaiveDate,
        exchange: &str,
        tokens: &[String],
        token_volumes: &BTreeMap<String, f64>,
    ) -> Self {
        let volumes: Vec<(String, f64)> = tokens
            .iter()
            .map(|token| {
                let raw = token_volumes.get(token).copied().unwrap_or(0.0);
                (token.clone(), round_usd(raw))
            })
            .collect();
        let total = round_usd(
            tokens
                .iter()
                .map(|token| token_volumes.get(token).copied().unwrap_or(0.0))
                .sum(),
        );

        VolumeRow {
            date,
            exchange: exchange.to_string(),
            volumes,
            total,
        }
    }

    pub fn key(&self) -> RowKey {
        RowKey::new(self.date, self.exchange.clone())
    }

    pub fn volume(&self, token: &str) -> Option<f64> {
        self.volumes
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| *v)
    }
}

pub fn round_usd(value: f64) -> f64 {
    let factor = 10f64.powi(VOLUME_DECIMALS);
    (value * factor).round() / factor
}

impl Serialize for VolumeRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.volumes.len() + 3))?;
        map.serialize_entry("Date", &self.date)?;
        map.serialize_entry("Exchange", &self.exchange)?;
        for (token, volume) in &self.volumes {
            map.serialize_entry(token, volume)?;
        }
        map.serialize_entry("Total", &self.total)?;
        map.end()
    }
}

#[derive(Deserialize)]
struct RawVolumeRow {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Exchange")]
    exchange: String,
    #[serde(rename = "Total")]
    total: f64,
    #[serde(flatten)]
    volumes: BTreeMap<String, f64>,
}

impl<'de> Deserialize<'de> for VolumeRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawVolumeRow::deserialize(deserializer)?;
        if raw.exchange.is_empty() {
            return Err(de::Error::custom("empty Exchange"));
        }
        if raw.volumes.values().any(|v| !v.is_finite() || *v < 0.0) || !raw.total.is_finite() {
            return Err(de::Error::custom("volume fields must be finite and non-negative"));
        }

        Ok(VolumeRow {
            date: raw.date,
            exchange: raw.exchange,
            volumes: raw.volumes.into_iter().collect(),
            total: raw.total,
        })
    }
}

/// Configuration for the backfill run
#[derive(Debug, Clone, Deserialize)]
pub struct BackfillConfig {
    // Dataset
    pub target_tokens: Vec<String>,
    pub start_date: NaiveDate,
    pub store_path: PathBuf,
    #[serde(default)]
    pub report_path: Option<PathBuf>,

    // Upstream
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // Rate Limiting
    pub request_delay_secs: f64,
    #[serde(default = "default_max_retry_wait_secs")]
    pub max_retry_wait_secs: u64,

    // Logging
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_base_url() -> String {
    "https://api.coinalyze.net/v1".to_string()
}

fn default_api_key_env() -> String {
    "COINALYZE_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retry_wait_secs() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BackfillConfig {
    pub fn new(target_tokens: &[&str], start_date: NaiveDate, store_path: impl Into<PathBuf>) -> Self {
        BackfillConfig {
            target_tokens: target_tokens.iter().map(|t| t.to_string()).collect(),
            start_date,
            store_path: store_path.into(),
            report_path: None,
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
            request_delay_secs: 0.0,
            max_retry_wait_secs: default_max_retry_wait_secs(),
            log_level: default_log_level(),
        }
    }

    /// Upper-cased, de-duplicated token list in configured order
    pub fn tokens(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.target_tokens
            .iter()
            .map(|t| t.trim().to_ascii_uppercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect()
    }

    pub fn request_delay(&self) -> Duration {
        if self.request_delay_secs.is_finite() && self.request_delay_secs > 0.0 {
            Duration::from_secs_f64(self.request_delay_secs)
        } else {
            Duration::ZERO
        }
    }

    pub fn max_retry_wait(&self) -> Duration {
        Duration::from_secs(self.max_retry_wait_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> Vec<String> {
        vec!["BTC".to_string(), "ETH".to_string()]
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut volumes = BTreeMap::new();
        volumes.insert("ETH".to_string(), 50.0);
        volumes.insert("BTC".to_string(), 100.0);

        let row = VolumeRow::from_token_volumes(date, "Alpha", &tokens(), &volumes);
        let json = serde_json::to_string(&row).unwrap();

        assert_eq!(
            json,
            r#"{"Date":"2024-06-01","Exchange":"Alpha","BTC":100.0,"ETH":50.0,"Total":150.0}"#
        );
    }

    #[test]
    fn test_missing_token_defaults_to_zero() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut volumes = BTreeMap::new();
        volumes.insert("ETH".to_string(), 12.345);

        let row = VolumeRow::from_token_volumes(date, "Beta", &tokens(), &volumes);

        assert_eq!(row.volume("BTC"), Some(0.0));
        assert_eq!(row.volume("ETH"), Some(12.35));
        assert_eq!(row.total, 12.35);
    }

    #[test]
    fn test_row_parses_python_written_layout() {
        let json = r#"{"Date":"2024-06-01","Exchange":"Binance","SOL":1.5,"BTC":2.0,"Total":3.5}"#;
        let row: VolumeRow = serde_json::from_str(json).unwrap();

        assert_eq!(row.exchange, "Binance");
        assert_eq!(row.volume("SOL"), Some(1.5));
        assert_eq!(row.total, 3.5);
        assert_eq!(row.key(), RowKey::new(row.date, "Binance"));
    }

    #[test]
    fn test_row_rejects_non_numeric_token() {
        let json = r#"{"Date":"2024-06-01","Exchange":"Binance","BTC":"lots","Total":3.5}"#;
        assert!(serde_json::from_str::<VolumeRow>(json).is_err());

        let json = r#"{"Date":"June 1st","Exchange":"Binance","BTC":1.0,"Total":1.0}"#;
        assert!(serde_json::from_str::<VolumeRow>(json).is_err());
    }

    #[test]
    fn test_config_tokens_are_normalized() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let config = BackfillConfig::new(&["btc", "ETH", " BTC ", ""], date, "data/v.json");

        assert_eq!(config.tokens(), vec!["BTC".to_string(), "ETH".to_string()]);
        assert_eq!(config.request_delay(), Duration::ZERO);
    }

    #[test]
    fn test_candle_usd_volume() {
        let candle = Candle {
            t: 1_717_200_000,
            c: Some(2.0),
            v: Some(10.0),
            ..Default::default()
        };
        assert_eq!(candle.usd_volume(), Some(20.0));

        let missing_close = Candle { c: None, ..candle.clone() };
        assert_eq!(missing_close.usd_volume(), None);

        let missing_volume = Candle { v: None, ..candle };
        assert_eq!(missing_volume.usd_volume(), None);
    }
}
