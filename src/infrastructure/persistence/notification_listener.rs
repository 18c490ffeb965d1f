use crate::domain::errors::ListenerError;
use crate::domain::events::ChangeEvent;
use crate::domain::ports::ChangeEventSource;
use crate::infrastructure::observability::ExporterMetrics;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Parse a notification payload, dropping (and counting) anything malformed.
pub fn decode_notification(payload: &str, metrics: &ExporterMetrics) -> Option<ChangeEvent> {
    match ChangeEvent::from_payload(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            metrics.payloads_malformed_total.inc();
            warn!("Dropping malformed notification payload ({}): {:.200}", e, payload);
            None
        }
    }
}

fn listener_error(e: sqlx::Error) -> ListenerError {
    match e {
        sqlx::Error::PoolClosed => ListenerError::Closed,
        other => ListenerError::Connection {
            reason: other.to_string(),
        },
    }
}

/// `LISTEN` subscription on a PostgreSQL channel.
///
/// The listener owns one connection from the read-only pool; sqlx reconnects
/// it transparently after a dropped connection, reporting the drop once as a
/// connection error.
pub struct PgChangeEventSource {
    listener: Option<PgListener>,
    channel: String,
    metrics: ExporterMetrics,
}

impl PgChangeEventSource {
    pub async fn subscribe(
        pool: &PgPool,
        channel: &str,
        metrics: ExporterMetrics,
    ) -> Result<Self, ListenerError> {
        let mut listener = PgListener::connect_with(pool).await.map_err(listener_error)?;
        listener.listen(channel).await.map_err(listener_error)?;
        info!("Listening on channel {}", channel);

        Ok(Self {
            listener: Some(listener),
            channel: channel.to_string(),
            metrics,
        })
    }
}

#[async_trait]
impl ChangeEventSource for PgChangeEventSource {
    async fn next_event(&mut self, wait: Duration) -> Result<Option<ChangeEvent>, ListenerError> {
        let listener = self.listener.as_mut().ok_or(ListenerError::Closed)?;
        let deadline = Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let notification = match tokio::time::timeout(remaining, listener.recv()).await {
                Err(_elapsed) => return Ok(None),
                Ok(received) => received.map_err(listener_error)?,
            };

            if let Some(event) = decode_notification(notification.payload(), &self.metrics) {
                return Ok(Some(event));
            }
        }
    }

    async fn close(&mut self) -> Result<(), ListenerError> {
        if let Some(mut listener) = self.listener.take() {
            listener.unlisten_all().await.map_err(listener_error)?;
            info!("Stopped listening on channel {}", self.channel);
        }
        Ok(())
    }
}
