//! Scriptable stand-ins for the store and the sink.
//!
//! Used by the test suites to drive the scheduler without PostgreSQL or an
//! InfluxDB endpoint.

use crate::domain::errors::{ListenerError, SinkError};
use crate::domain::events::ChangeEvent;
use crate::domain::kpi::KpiSnapshot;
use crate::domain::ports::{ChangeEventSource, MetricSink};
use crate::domain::repositories::KpiRepository;
use crate::infrastructure::observability::ExporterMetrics;
use crate::infrastructure::persistence::notification_listener::decode_notification;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

/// KPI repository returning a fixed snapshot, optionally failing
#[derive(Default)]
pub struct MockKpiRepository {
    snapshot: Mutex<KpiSnapshot>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MockKpiRepository {
    pub fn new(snapshot: KpiSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    pub async fn set_snapshot(&self, snapshot: KpiSnapshot) {
        *self.snapshot.lock().await = snapshot;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of fetch attempts, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KpiRepository for MockKpiRepository {
    async fn fetch_snapshot(&self) -> Result<KpiSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("mock KPI view unavailable");
        }
        Ok(*self.snapshot.lock().await)
    }
}

/// Sink that keeps every delivered payload in memory
#[derive(Default)]
pub struct RecordingSink {
    payloads: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of emit calls, rejected ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successfully delivered payloads, oldest first
    pub async fn payloads(&self) -> Vec<String> {
        self.payloads.lock().await.clone()
    }
}

#[async_trait]
impl MetricSink for RecordingSink {
    async fn emit(&self, payload: &str) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Status {
                status: 503,
                body: "mock sink unavailable".to_string(),
            });
        }
        self.payloads.lock().await.push(payload.to_string());
        Ok(())
    }
}

/// Event source fed with raw notification payloads over a channel.
///
/// Payloads go through the same decoding as the PostgreSQL listener, so
/// malformed input is dropped the same way. Dropping every sender ends the
/// subscription.
pub struct ChannelEventSource {
    rx: mpsc::Receiver<String>,
    metrics: ExporterMetrics,
    closed: Arc<AtomicBool>,
}

impl ChannelEventSource {
    pub fn channel(capacity: usize, metrics: ExporterMetrics) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                rx,
                metrics,
                closed: Arc::new(AtomicBool::new(false)),
            },
        )
    }

    /// Flag set once `close` has run
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

#[async_trait]
impl ChangeEventSource for ChannelEventSource {
    async fn next_event(&mut self, wait: Duration) -> Result<Option<ChangeEvent>, ListenerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ListenerError::Closed);
        }
        let deadline = Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let payload = match tokio::time::timeout(remaining, self.rx.recv()).await {
                Err(_elapsed) => return Ok(None),
                Ok(None) => return Err(ListenerError::Closed),
                Ok(Some(payload)) => payload,
            };

            if let Some(event) = decode_notification(&payload, &self.metrics) {
                return Ok(Some(event));
            }
        }
    }

    async fn close(&mut self) -> Result<(), ListenerError> {
        self.rx.close();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
