//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Upper bound on records per batch.
const MAX_BATCH_SIZE_UPPER_BOUND: usize = 10_000;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_ledger(config)?;
    validate_remision(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_ledger(config: &Config) -> ConfigResult<()> {
    let l = &config.ledger;
    if l.data_dir.trim().is_empty() {
        return Err(invalid("ledger.data_dir", "data_dir must not be empty"));
    }
    if l.verify_page_size == 0 {
        return Err(invalid(
            "ledger.verify_page_size",
            "verify_page_size must be at least 1",
        ));
    }
    Ok(())
}

fn validate_remision(config: &Config) -> ConfigResult<()> {
    let r = &config.remision;

    if let Some(endpoint) = &r.endpoint {
        if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
            return Err(invalid(
                "remision.endpoint",
                format!("endpoint '{endpoint}' must be an http(s) URL"),
            ));
        }
    }

    if r.api_token_env.trim().is_empty() {
        return Err(invalid(
            "remision.api_token_env",
            "api_token_env must name an environment variable",
        ));
    }

    if r.max_batch_size == 0 || r.max_batch_size > MAX_BATCH_SIZE_UPPER_BOUND {
        return Err(invalid(
            "remision.max_batch_size",
            format!("max_batch_size must be between 1 and {MAX_BATCH_SIZE_UPPER_BOUND}"),
        ));
    }

    if r.max_attempts == 0 {
        return Err(invalid(
            "remision.max_attempts",
            "max_attempts must be at least 1",
        ));
    }

    if r.backoff_max_ms < r.backoff_base_ms {
        return Err(invalid(
            "remision.backoff_max_ms",
            format!(
                "backoff_max_ms ({}) must not be below backoff_base_ms ({})",
                r.backoff_max_ms, r.backoff_base_ms
            ),
        ));
    }

    if r.request_timeout_secs == 0 {
        return Err(invalid(
            "remision.request_timeout_secs",
            "request_timeout_secs must be at least 1",
        ));
    }

    if r.circuit_breaker_threshold == 0 {
        return Err(invalid(
            "remision.circuit_breaker_threshold",
            "circuit_breaker_threshold must be at least 1",
        ));
    }

    if r.software_id.trim().is_empty() {
        return Err(invalid("remision.software_id", "software_id must not be empty"));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unknown level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }
    Ok(())
}
