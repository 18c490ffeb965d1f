//! Metrics sink configuration parsing from environment variables.

use super::{EnvLookup, at_least, non_empty, parse_or};
use crate::domain::errors::ConfigError;
use std::time::Duration;
use url::Url;

/// InfluxDB write endpoint configuration
#[derive(Debug, Clone)]
pub struct SinkEnvConfig {
    pub url: Url,
    pub token: String,
    pub timeout: Duration,
}

impl SinkEnvConfig {
    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let raw_url = non_empty(lookup, "INFLUX_URL").ok_or(ConfigError::Missing { name: "INFLUX_URL" })?;
        let token =
            non_empty(lookup, "INFLUX_TOKEN").ok_or(ConfigError::Missing { name: "INFLUX_TOKEN" })?;

        let url = Url::parse(&raw_url).map_err(|e| ConfigError::Invalid {
            name: "INFLUX_URL",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "INFLUX_URL",
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let timeout_secs = at_least("INFLUX_TIMEOUT_SEC", parse_or(lookup, "INFLUX_TIMEOUT_SEC", 5u64)?, 1)?;

        Ok(Self {
            url,
            token,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
