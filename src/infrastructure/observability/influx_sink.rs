//! Metric sinks: the InfluxDB HTTP write endpoint and a stdout sink for dry
//! runs.

use crate::config::SinkEnvConfig;
use crate::domain::errors::SinkError;
use crate::domain::ports::MetricSink;
use crate::infrastructure::core::HttpClientFactory;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

/// Longest slice of an error response kept for the log
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Posts line-protocol payloads to an InfluxDB write endpoint
pub struct InfluxSink {
    client: Client,
    url: Url,
    authorization: String,
}

impl InfluxSink {
    pub fn new(config: &SinkEnvConfig) -> Result<Self, SinkError> {
        Ok(Self {
            client: HttpClientFactory::create_client(config.timeout)?,
            url: config.url.clone(),
            authorization: format!("Token {}", config.token),
        })
    }
}

#[async_trait]
impl MetricSink for InfluxSink {
    async fn emit(&self, payload: &str) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(payload.to_owned())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        debug!("InfluxSink: Wrote {} bytes (HTTP {})", payload.len(), status.as_u16());
        Ok(())
    }
}

/// Writes payloads to stdout instead of delivering them
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl MetricSink for StdoutSink {
    async fn emit(&self, payload: &str) -> Result<(), SinkError> {
        let mut out = tokio::io::stdout();
        out.write_all(payload.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }
}
