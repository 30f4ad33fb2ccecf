/// Configuration loading from TOML file with environment overrides
use std::path::Path;

use ::config::{Config, Environment, File, FileFormat};

use crate::error::{Result, VolumeError};
use crate::types::BackfillConfig;

/// Environment variables named `PERPS_VOLUME_<KEY>` override file values
pub const ENV_PREFIX: &str = "PERPS_VOLUME";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BackfillConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(VolumeError::ConfigError(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let settings = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("target_tokens"),
        )
        .build()
        .map_err(|e| VolumeError::ConfigError(format!("Failed to read config file: {}", e)))?;

    let config: BackfillConfig = settings
        .try_deserialize()
        .map_err(|e| VolumeError::ConfigError(format!("Failed to parse config: {}", e)))?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &BackfillConfig) -> Result<()> {
    if config.tokens().is_empty() {
        return Err(VolumeError::ConfigError("target_tokens is empty".to_string()));
    }

    if !config.request_delay_secs.is_finite() || config.request_delay_secs < 0.0 {
        return Err(VolumeError::ConfigError(format!(
            "Invalid request_delay_secs: {}",
            config.request_delay_secs
        )));
    }

    if config.store_path.as_os_str().is_empty() {
        return Err(VolumeError::ConfigError("store_path is empty".to_string()));
    }

    if config.api_base_url.trim().is_empty() {
        return Err(VolumeError::ConfigError("api_base_url is empty".to_string()));
    }

    if config.request_timeout_secs == 0 {
        return Err(VolumeError::ConfigError("request_timeout_secs must be > 0".to_string()));
    }

    Ok(())
}
