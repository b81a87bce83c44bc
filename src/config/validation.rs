use crate::config::types::{Compression, Config};
use crate::ConfigError;
use std::net::IpAddr;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_workers(config)?;
    validate_timing(config)?;
    validate_storage(config)?;
    validate_compression(config)?;
    validate_dns_overrides(config)?;
    validate_extensions(&config.extra_asset_extensions)?;
    validate_log_level(&config.log_level)?;
    Ok(())
}

/// Validates worker pool sizes and retry limits
fn validate_workers(config: &Config) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    if config.asset_workers > 100 {
        return Err(ConfigError::Validation(format!(
            "asset_workers must be at most 100, got {}",
            config.asset_workers
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max_retries must be >= 1".to_string(),
        ));
    }

    if config.circuit_threshold < 1 {
        return Err(ConfigError::Validation(
            "circuit_threshold must be >= 1".to_string(),
        ));
    }

    if matches!(config.browser_max_pages, Some(0)) {
        return Err(ConfigError::Validation(
            "browser_max_pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates timeouts and delays
fn validate_timing(config: &Config) -> Result<(), ConfigError> {
    if !(config.timeout_seconds.is_finite() && config.timeout_seconds > 0.0) {
        return Err(ConfigError::Validation(format!(
            "timeout_seconds must be > 0, got {}",
            config.timeout_seconds
        )));
    }

    let non_negative = [
        ("request_delay", config.request_delay),
        ("circuit_timeout_seconds", config.circuit_timeout_seconds),
        ("min_shutdown_seconds", config.min_shutdown_seconds),
        ("stats_cache_ttl_seconds", config.stats_cache_ttl_seconds),
    ];
    for (name, value) in non_negative {
        if !(value.is_finite() && value >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 0, got {}",
                name, value
            )));
        }
    }

    if config.browser_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "browser_timeout_ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates database settings
fn validate_storage(config: &Config) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data_dir cannot be empty".to_string(),
        ));
    }

    if config.db_pool_size < 1 {
        return Err(ConfigError::Validation(format!(
            "db_pool_size must be >= 1, got {}",
            config.db_pool_size
        )));
    }

    if !(config.db_timeout_seconds.is_finite() && config.db_timeout_seconds > 0.0) {
        return Err(ConfigError::Validation(format!(
            "db_timeout_seconds must be > 0, got {}",
            config.db_timeout_seconds
        )));
    }

    Ok(())
}

/// Validates the compression level against the chosen codec
fn validate_compression(config: &Config) -> Result<(), ConfigError> {
    let range = match config.compression {
        Compression::Zstd => 1..=22,
        Compression::Gzip => 0..=9,
        Compression::None => return Ok(()),
    };

    if !range.contains(&config.compression_level) {
        return Err(ConfigError::Validation(format!(
            "compression_level {} out of range {:?} for {:?}",
            config.compression_level, range, config.compression
        )));
    }

    Ok(())
}

/// Validates that every DNS override maps a host to an IP literal
fn validate_dns_overrides(config: &Config) -> Result<(), ConfigError> {
    for (host, ip) in &config.dns_overrides {
        if host.trim().is_empty() || host.contains('/') {
            return Err(ConfigError::Validation(format!(
                "dns_overrides host '{}' is not a hostname",
                host
            )));
        }

        ip.parse::<IpAddr>().map_err(|_| {
            ConfigError::Validation(format!(
                "dns_overrides entry for '{}' must be an IP address, got '{}'",
                host, ip
            ))
        })?;
    }

    Ok(())
}

/// Validates extra asset suffixes (must look like ".ext")
fn validate_extensions(extensions: &[String]) -> Result<(), ConfigError> {
    for ext in extensions {
        let valid = ext.len() > 1
            && ext.starts_with('.')
            && ext[1..].chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(ConfigError::Validation(format!(
                "extra_asset_extensions entries must look like '.ext', got '{}'",
                ext
            )));
        }
    }
    Ok(())
}

fn validate_log_level(level: &str) -> Result<(), ConfigError> {
    if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::Validation(format!(
            "log_level must be one of {:?}, got '{}'",
            LOG_LEVELS, level
        )));
    }
    Ok(())
}
