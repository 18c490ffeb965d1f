//! Dual-cadence export scheduler.
//!
//! A single task multiplexes the notification wait against two timers:
//!
//! - **Reactive**: a newly guarded change event arms a pending export that
//!   fires once its debounce window has passed. Events arriving while an
//!   export is pending only push the due time back, so a burst collapses
//!   into one export.
//! - **Safety**: an unconditional export every `safety_interval`, which
//!   bounds staleness when notifications are lost.
//!
//! Export failures are logged and never retried early. A failed pending
//! export is dropped; a failed safety push waits for the next interval.

use crate::application::export::pipeline::{ExportPipeline, ExportTrigger};
use crate::config::ExportEnvConfig;
use crate::domain::errors::ListenerError;
use crate::domain::events::ChangeEvent;
use crate::domain::ports::ChangeEventSource;
use crate::domain::repositories::ExportGuardRepository;
use crate::infrastructure::observability::ExporterMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Upper bound on events drained per wakeup, so a flood cannot starve the
/// timers.
const MAX_DRAIN_PER_WAKEUP: usize = 512;

/// Reactive export state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    PendingExport { due: Instant },
}

pub struct ExportScheduler {
    source: Box<dyn ChangeEventSource>,
    guard: Arc<dyn ExportGuardRepository>,
    pipeline: ExportPipeline,
    metrics: ExporterMetrics,
    safety_interval: Duration,
    debounce: Duration,
    poll_interval: Duration,
    state: ExportState,
    last_safety_push: Option<Instant>,
}

impl ExportScheduler {
    pub fn new(
        source: Box<dyn ChangeEventSource>,
        guard: Arc<dyn ExportGuardRepository>,
        pipeline: ExportPipeline,
        config: &ExportEnvConfig,
        metrics: ExporterMetrics,
    ) -> Self {
        Self {
            source,
            guard,
            pipeline,
            metrics,
            safety_interval: config.safety_interval,
            debounce: config.debounce,
            poll_interval: config.poll_interval,
            state: ExportState::Idle,
            last_safety_push: None,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Drive the scheduler until `shutdown` flips to `true` (or its sender is
    /// dropped). Returns an error only if the subscription ends by itself.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ListenerError> {
        info!(
            "ExportScheduler: Started (safety every {:?}, debounce {:?}, poll {:?})",
            self.safety_interval, self.debounce, self.poll_interval
        );

        let outcome = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            let waited = tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                waited = self.source.next_event(self.poll_interval) => waited,
            };

            match waited {
                Ok(Some(event)) => {
                    self.handle_event(event).await;
                    self.drain_ready().await;
                }
                Ok(None) => {}
                Err(ListenerError::Closed) => {
                    error!("ExportScheduler: Notification subscription closed. Stopping.");
                    break Err(ListenerError::Closed);
                }
                Err(e) => {
                    warn!("ExportScheduler: {}", e);
                    // Back off so a dead connection does not spin the loop
                    tokio::select! {
                        _ = shutdown.changed() => break Ok(()),
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }

            self.run_due_exports(Instant::now()).await;
        };

        if let Err(e) = self.source.close().await {
            warn!("ExportScheduler: Failed to close subscription cleanly: {}", e);
        }
        info!("ExportScheduler: Stopped.");
        outcome
    }

    /// Consume events that are already buffered without waiting.
    async fn drain_ready(&mut self) {
        for _ in 0..MAX_DRAIN_PER_WAKEUP {
            match self.source.next_event(Duration::ZERO).await {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => return,
                // Surfaced again by the next regular wait
                Err(e) => {
                    debug!("ExportScheduler: Drain interrupted: {}", e);
                    return;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: ChangeEvent) {
        self.metrics.events_received_total.inc();

        match self.guard.try_mark_exported(event.entity_id).await {
            Ok(true) => {
                let due = Instant::now() + self.debounce;
                if matches!(self.state, ExportState::PendingExport { .. }) {
                    debug!(
                        "ExportScheduler: Entity {} pushed pending export back by {:?}",
                        event.entity_id, self.debounce
                    );
                } else {
                    info!(
                        "ExportScheduler: Entity {} scheduled an export (client {}, session {})",
                        event.entity_id,
                        event.client_id.as_ref().map(|c| c.to_string()).unwrap_or_default(),
                        event.session_id.as_ref().map(|s| s.to_string()).unwrap_or_default(),
                    );
                }
                self.state = ExportState::PendingExport { due };
            }
            Ok(false) => {
                self.metrics.events_duplicate_total.inc();
                debug!("ExportScheduler: Entity {} already exported, ignoring", event.entity_id);
            }
            Err(e) => {
                self.metrics.guard_failures_total.inc();
                warn!(
                    "ExportScheduler: Guard check failed for entity {}: {:#}",
                    event.entity_id, e
                );
            }
        }
    }

    fn safety_due(&self, now: Instant) -> bool {
        match self.last_safety_push {
            None => true,
            Some(last) => now.duration_since(last) >= self.safety_interval,
        }
    }

    async fn run_due_exports(&mut self, now: Instant) {
        if self.safety_due(now) {
            match self.pipeline.export(ExportTrigger::Safety).await {
                Ok(report) => info!("ExportScheduler: Safety push OK (bucket {})", report.bucket),
                Err(e) => warn!("ExportScheduler: Safety push failed: {}", e),
            }
            // Advanced on failure as well; retries wait a full interval
            self.last_safety_push = Some(now);
        }

        if let ExportState::PendingExport { due } = self.state
            && due <= now
        {
            self.state = ExportState::Idle;
            match self.pipeline.export(ExportTrigger::Reactive).await {
                Ok(report) => info!("ExportScheduler: Export OK (bucket {})", report.bucket),
                Err(e) => warn!("ExportScheduler: Export failed, leaving it to the safety push: {}", e),
            }
        }
    }
}
