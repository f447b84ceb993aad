//! Configuration loading from environment variables.

use crate::config::{
    BindAddress, ServerTimeouts, Settings, DEFAULT_MAX_HEADER_BYTES, DEFAULT_SHUTDOWN_TIMEOUT,
    DEFAULT_TIMEOUT,
};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const ENV_SERVER_HOST: &str = "SERVER_HOST";
pub const ENV_SERVER_PORT: &str = "SERVER_PORT";
pub const ENV_ADMIN_PORT: &str = "ADMIN_PORT";
pub const ENV_READ_TIMEOUT: &str = "READ_TIMEOUT";
pub const ENV_READ_HEADER_TIMEOUT: &str = "READ_HEADER_TIMEOUT";
pub const ENV_WRITE_TIMEOUT: &str = "WRITE_TIMEOUT";
pub const ENV_IDLE_TIMEOUT: &str = "IDLE_TIMEOUT";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "SHUTDOWN_TIMEOUT";
pub const ENV_MAX_HEADER_BYTES: &str = "MAX_HEADER_BYTES";
pub const ENV_API_KEY: &str = "API_KEY";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid address '{host}:': {var} is not set")]
    MissingPort { var: &'static str, host: String },

    #[error("invalid port '{value}' in {var}")]
    InvalidPort { var: &'static str, value: String },
}

/// Load settings from the process environment.
pub fn load_from_env() -> Result<Settings, ConfigError> {
    load_settings(|key| std::env::var(key).ok())
}

/// Load settings through an arbitrary variable lookup.
///
/// Addresses are strict: a missing or malformed port is an error. Every
/// timeout and the header cap fall back to their default on their own when
/// absent or unparsable.
pub fn load_settings<F>(lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let host = lookup(ENV_SERVER_HOST).unwrap_or_default();
    let api_address = read_address(&host, ENV_SERVER_PORT, lookup(ENV_SERVER_PORT))?;
    let admin_address = read_address(&host, ENV_ADMIN_PORT, lookup(ENV_ADMIN_PORT))?;

    let timeouts = ServerTimeouts {
        read: parse_duration(ENV_READ_TIMEOUT, lookup(ENV_READ_TIMEOUT), DEFAULT_TIMEOUT),
        read_header: parse_duration(
            ENV_READ_HEADER_TIMEOUT,
            lookup(ENV_READ_HEADER_TIMEOUT),
            DEFAULT_TIMEOUT,
        ),
        write: parse_duration(ENV_WRITE_TIMEOUT, lookup(ENV_WRITE_TIMEOUT), DEFAULT_TIMEOUT),
        idle: parse_duration(ENV_IDLE_TIMEOUT, lookup(ENV_IDLE_TIMEOUT), DEFAULT_TIMEOUT),
        max_header_bytes: parse_usize(
            ENV_MAX_HEADER_BYTES,
            lookup(ENV_MAX_HEADER_BYTES),
            DEFAULT_MAX_HEADER_BYTES,
        ),
    };

    let shutdown_timeout = parse_duration(
        ENV_SHUTDOWN_TIMEOUT,
        lookup(ENV_SHUTDOWN_TIMEOUT),
        DEFAULT_SHUTDOWN_TIMEOUT,
    );

    Ok(Settings {
        api_address,
        admin_address,
        timeouts,
        shutdown_timeout,
        api_key: lookup(ENV_API_KEY).unwrap_or_default(),
    })
}

fn read_address(
    host: &str,
    var: &'static str,
    port: Option<String>,
) -> Result<BindAddress, ConfigError> {
    let port = port.unwrap_or_default();
    let port = port.trim();

    if port.is_empty() {
        return Err(ConfigError::MissingPort {
            var,
            host: host.to_string(),
        });
    }

    let port = port.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
        var,
        value: port.to_string(),
    })?;

    Ok(BindAddress::new(host, port))
}

fn parse_duration(var: &str, value: Option<String>, fallback: Duration) -> Duration {
    let Some(value) = value else {
        return fallback;
    };

    match humantime::parse_duration(value.trim()) {
        Ok(duration) => duration,
        Err(e) => {
            warn!(
                var,
                value = %value,
                error = %e,
                fallback = %humantime::format_duration(fallback),
                "invalid duration, using default"
            );
            fallback
        }
    }
}

fn parse_usize(var: &str, value: Option<String>, fallback: usize) -> usize {
    let Some(value) = value else {
        return fallback;
    };

    match value.trim().parse::<usize>() {
        Ok(n) => n,
        Err(e) => {
            warn!(var, value = %value, error = %e, fallback, "invalid integer, using default");
            fallback
        }
    }
}
