//! Export cadence and encoding configuration parsing from environment variables.

use super::{EnvLookup, at_least, parse_or, var_or};
use crate::domain::errors::ConfigError;
use std::time::Duration;

pub const UNKNOWN_TAG: &str = "unknown";

/// Fixed tag set attached to every line in tagged mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet {
    pub cluster_id: String,
    pub env: String,
    pub region: String,
}

impl Default for TagSet {
    fn default() -> Self {
        Self {
            cluster_id: UNKNOWN_TAG.to_string(),
            env: UNKNOWN_TAG.to_string(),
            region: UNKNOWN_TAG.to_string(),
        }
    }
}

/// How metric lines are labelled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingMode {
    /// Measurement name only, no tags
    Anonymized,
    /// Every line carries the deployment tag set
    Tagged(TagSet),
}

/// Export environment configuration
#[derive(Debug, Clone)]
pub struct ExportEnvConfig {
    pub mode: EncodingMode,
    pub bucket_width: Duration,
    pub safety_interval: Duration,
    pub debounce: Duration,
    pub poll_interval: Duration,
}

impl Default for ExportEnvConfig {
    fn default() -> Self {
        Self {
            mode: EncodingMode::Anonymized,
            bucket_width: Duration::from_secs(60),
            safety_interval: Duration::from_secs(600),
            debounce: Duration::ZERO,
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl ExportEnvConfig {
    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        // Anything other than a literal "true" selects tagged mode
        let anonymized = var_or(lookup, "ANON_MODE", "true").eq_ignore_ascii_case("true");
        let mode = if anonymized {
            EncodingMode::Anonymized
        } else {
            EncodingMode::Tagged(TagSet {
                cluster_id: var_or(lookup, "CLUSTER_ID", UNKNOWN_TAG),
                env: var_or(lookup, "ENV_TAG", UNKNOWN_TAG),
                region: var_or(lookup, "REGION_TAG", UNKNOWN_TAG),
            })
        };

        let bucket_secs = at_least("BUCKET_SECONDS", parse_or(lookup, "BUCKET_SECONDS", 60u64)?, 1)?;
        let safety_secs = at_least(
            "SAFETY_PUSH_EVERY_SEC",
            parse_or(lookup, "SAFETY_PUSH_EVERY_SEC", 600u64)?,
            1,
        )?;
        let debounce_secs = parse_or(lookup, "EXPORT_DEBOUNCE_SEC", 0u64)?;
        let poll_ms = at_least("POLL_INTERVAL_MS", parse_or(lookup, "POLL_INTERVAL_MS", 1000u64)?, 1)?;

        Ok(Self {
            mode,
            bucket_width: Duration::from_secs(bucket_secs),
            safety_interval: Duration::from_secs(safety_secs),
            debounce: Duration::from_secs(debounce_secs),
            poll_interval: Duration::from_millis(poll_ms),
        })
    }
}
