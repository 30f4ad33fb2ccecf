/// Centralized error types for the volume backfill
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VolumeError {
    // Upstream Errors
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Market fetch failed for {symbol} on {date}: {message}")]
    MarketFetchFailed {
        symbol: String,
        date: String,
        message: String,
    },

    #[error("Rate limited, retry after {retry_after_secs:.1}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("Rate limit wait budget exhausted: {0}")]
    RateLimitExceeded(String),

    #[error("Upstream API error: {status} - {message}")]
    UpstreamApiError { status: u16, message: String },

    // Network Errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    // Data Errors
    #[error("Malformed candle: {0}")]
    MalformedCandle(String),

    #[error("Deserialization failed: {0}")]
    DeserializationError(#[from] serde_json::Error),

    // Store Errors
    #[error("Corrupt store {path}: {reason}")]
    CorruptStore { path: String, reason: String },

    #[error("File I/O error: {0}")]
    FileError(#[from] std::io::Error),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, VolumeError>;

impl VolumeError {
    /// Check if the condition only costs a data point, not the run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VolumeError::MarketFetchFailed { .. }
                | VolumeError::RateLimited { .. }
                | VolumeError::RateLimitExceeded(_)
                | VolumeError::MalformedCandle(_)
                | VolumeError::UpstreamApiError { .. }
                | VolumeError::HttpError(_)
        )
    }

    /// Check if the error aborts the whole run before any commit
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VolumeError::UpstreamUnavailable(_)
                | VolumeError::CorruptStore { .. }
                | VolumeError::ConfigError(_)
        )
    }

    /// Get error code for logging/monitoring
    pub fn error_code(&self) -> &str {
        match self {
            VolumeError::UpstreamUnavailable(_) => "UPSTREAM_001",
            VolumeError::MarketFetchFailed { .. } => "UPSTREAM_002",
            VolumeError::RateLimited { .. } => "UPSTREAM_003",
            VolumeError::RateLimitExceeded(_) => "UPSTREAM_004",
            VolumeError::UpstreamApiError { .. } => "UPSTREAM_005",
            VolumeError::HttpError(_) => "NET_001",
            VolumeError::MalformedCandle(_) => "DATA_001",
            VolumeError::DeserializationError(_) => "DATA_002",
            VolumeError::CorruptStore { .. } => "STORE_001",
            VolumeError::FileError(_) => "STORE_002",
            VolumeError::ConfigError(_) => "CFG_001",
            VolumeError::InvalidParameter(_) => "CFG_002",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_taxonomy() {
        let corrupt = VolumeError::CorruptStore {
            path: "data/x.json".to_string(),
            reason: "missing ]".to_string(),
        };
        assert!(corrupt.is_fatal());
        assert!(!corrupt.is_recoverable());
        assert_eq!(corrupt.error_code(), "STORE_001");

        let upstream = VolumeError::UpstreamUnavailable("exchanges".to_string());
        assert!(upstream.is_fatal());

        let market = VolumeError::MarketFetchFailed {
            symbol: "BTCUSDT_PERP.A".to_string(),
            date: "2024-06-01".to_string(),
            message: "HTTP 500".to_string(),
        };
        assert!(market.is_recoverable());
        assert!(!market.is_fatal());
        assert!(market.to_string().contains("BTCUSDT_PERP.A"));
    }
}
