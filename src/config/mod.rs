//! Configuration module for the KPI exporter.
//!
//! Configuration is loaded once at startup from environment variables
//! (optionally seeded from a `.env` file by the binary) and handed to each
//! component explicitly. Sub-configs are organized by concern: Database,
//! Sink and Export.

mod database_config;
mod export_config;
mod sink_config;

pub use database_config::{DEFAULT_NOTIFY_CHANNEL, DatabaseEnvConfig};
pub use export_config::{EncodingMode, ExportEnvConfig, TagSet};
pub use sink_config::SinkEnvConfig;

use crate::domain::errors::ConfigError;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Variable lookup used by every sub-config.
///
/// Production reads the process environment; tests pass a map so they never
/// have to mutate global state.
pub(crate) type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseEnvConfig,
    pub sink: SinkEnvConfig,
    pub export: ExportEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseEnvConfig::from_lookup(lookup)?,
            sink: SinkEnvConfig::from_lookup(lookup)?,
            export: ExportEnvConfig::from_lookup(lookup)?,
        })
    }
}

/// Value of `name`, ignoring unset and blank variables.
pub(crate) fn non_empty(lookup: EnvLookup<'_>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn var_or(lookup: EnvLookup<'_>, name: &str, default: &str) -> String {
    non_empty(lookup, name).unwrap_or_else(|| default.to_string())
}

pub(crate) fn parse_or<T>(lookup: EnvLookup<'_>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match non_empty(lookup, name) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: format!("'{}': {}", raw, e),
        }),
        None => Ok(default),
    }
}

pub(crate) fn at_least(name: &'static str, value: u64, min: u64) -> Result<u64, ConfigError> {
    if value < min {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("must be at least {}, got {}", min, value),
        });
    }
    Ok(value)
}
