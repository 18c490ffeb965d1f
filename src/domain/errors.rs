use thiserror::Error;

/// Startup configuration problems. Any of these aborts the process before the
/// export loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {name}")]
    Missing { name: &'static str },

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Failures delivering a payload to the metrics sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink rejected payload with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Sink transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to write payload: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the change-notification subscription
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The connection hiccupped; the subscription may still recover.
    #[error("Notification connection error: {reason}")]
    Connection { reason: String },

    /// The subscription ended and will not yield further events.
    #[error("Notification subscription closed")]
    Closed,
}

/// Failure of a single export cycle. Never fatal to the scheduler.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("KPI aggregation failed: {0:#}")]
    Aggregation(anyhow::Error),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
