use crate::domain::errors::{ListenerError, SinkError};
use crate::domain::events::ChangeEvent;
use async_trait::async_trait;
use std::time::Duration;

/// Subscription to change notifications.
///
/// The sequence is infinite and cannot be restarted once closed. Payloads that
/// fail to parse are skipped by the implementation and never reach the caller.
#[async_trait]
pub trait ChangeEventSource: Send {
    /// Wait at most `wait` for the next event. `Ok(None)` means the wait
    /// elapsed with nothing to report.
    async fn next_event(&mut self, wait: Duration) -> Result<Option<ChangeEvent>, ListenerError>;

    /// Stop listening and release the underlying connection.
    async fn close(&mut self) -> Result<(), ListenerError>;
}

/// Destination for encoded metric payloads
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Deliver one payload. Implementations never retry.
    async fn emit(&self, payload: &str) -> Result<(), SinkError>;
}
