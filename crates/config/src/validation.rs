//! Configuration validation
//!
//! Validates config consistency:
//! - At least one sink is enabled
//! - Required fields are present for enabled sinks
//! - Remote tuning values are usable

use crate::Config;
use crate::error::{ConfigError, Result};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if !config.console.enabled && !config.file.enabled && !config.remote.enabled {
        return Err(ConfigError::NoSinksEnabled);
    }

    validate_file(config)?;
    validate_remote(config)?;
    Ok(())
}

fn validate_file(config: &Config) -> Result<()> {
    let file = &config.file;
    if !file.enabled {
        return Ok(());
    }

    if file.path.is_empty() {
        return Err(ConfigError::missing_field("sink", "file", "path"));
    }
    if file.max_size_mb == 0 {
        return Err(ConfigError::invalid_value(
            "sink",
            "file",
            "max_size_mb",
            "must be greater than 0",
        ));
    }
    if file.max_size_bytes().is_none() {
        return Err(ConfigError::invalid_value(
            "sink",
            "file",
            "max_size_mb",
            "too large",
        ));
    }

    Ok(())
}

fn validate_remote(config: &Config) -> Result<()> {
    let remote = &config.remote;
    if !remote.enabled {
        return Ok(());
    }

    if remote.url.is_empty() {
        return Err(ConfigError::missing_field("sink", "remote", "url"));
    }
    if remote.index.is_empty() {
        return Err(ConfigError::missing_field("sink", "remote", "index"));
    }
    if !remote.url.starts_with("http://") && !remote.url.starts_with("https://") {
        return Err(ConfigError::invalid_value(
            "sink",
            "remote",
            "url",
            "must start with http:// or https://",
        ));
    }
    if remote.workers == 0 {
        return Err(ConfigError::invalid_value(
            "sink",
            "remote",
            "workers",
            "must be greater than 0",
        ));
    }
    if remote.flush_bytes == 0 {
        return Err(ConfigError::invalid_value(
            "sink",
            "remote",
            "flush_bytes",
            "must be greater than 0",
        ));
    }
    if remote.queue_size == 0 {
        return Err(ConfigError::invalid_value(
            "sink",
            "remote",
            "queue_size",
            "must be greater than 0",
        ));
    }
    if remote.flush_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "sink",
            "remote",
            "flush_interval",
            "must be greater than 0",
        ));
    }

    remote.time_zone()?;
    Ok(())
}
