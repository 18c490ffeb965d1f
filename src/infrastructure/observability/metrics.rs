//! Internal counters for the exporter itself
//!
//! All metrics use the `kpi_exporter_` prefix. They are never served over
//! HTTP; the binary renders them into the log at shutdown.

use crate::application::export::ExportTrigger;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus metrics for the export daemon
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Arc<Registry>,
    /// Parsed change events handed to the scheduler
    pub events_received_total: IntCounter,
    /// Events whose entity was already guarded
    pub events_duplicate_total: IntCounter,
    /// Notification payloads dropped because they did not parse
    pub payloads_malformed_total: IntCounter,
    /// Guard inserts that errored
    pub guard_failures_total: IntCounter,
    /// Export cycles by trigger and outcome
    pub exports_total: IntCounterVec,
    /// Bucket timestamp (ns) of the last successful export
    pub last_export_bucket_ns: IntGauge,
}

impl ExporterMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_received_total = IntCounter::with_opts(Opts::new(
            "kpi_exporter_events_received_total",
            "Change events received from the store",
        ))?;
        registry.register(Box::new(events_received_total.clone()))?;

        let events_duplicate_total = IntCounter::with_opts(Opts::new(
            "kpi_exporter_events_duplicate_total",
            "Change events ignored because the entity was already guarded",
        ))?;
        registry.register(Box::new(events_duplicate_total.clone()))?;

        let payloads_malformed_total = IntCounter::with_opts(Opts::new(
            "kpi_exporter_payloads_malformed_total",
            "Notification payloads dropped as unparseable",
        ))?;
        registry.register(Box::new(payloads_malformed_total.clone()))?;

        let guard_failures_total = IntCounter::with_opts(Opts::new(
            "kpi_exporter_guard_failures_total",
            "Guard inserts that failed",
        ))?;
        registry.register(Box::new(guard_failures_total.clone()))?;

        let exports_total = IntCounterVec::new(
            Opts::new("kpi_exporter_exports_total", "Export cycles by trigger and outcome"),
            &["trigger", "outcome"],
        )?;
        registry.register(Box::new(exports_total.clone()))?;

        let last_export_bucket_ns = IntGauge::with_opts(Opts::new(
            "kpi_exporter_last_export_bucket_ns",
            "Bucket timestamp of the last successful export",
        ))?;
        registry.register(Box::new(last_export_bucket_ns.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            events_received_total,
            events_duplicate_total,
            payloads_malformed_total,
            guard_failures_total,
            exports_total,
            last_export_bucket_ns,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn record_export(&self, trigger: ExportTrigger, succeeded: bool) {
        let outcome = if succeeded { "ok" } else { "failed" };
        self.exports_total
            .with_label_values(&[trigger.as_str(), outcome])
            .inc();
    }

    pub fn export_count(&self, trigger: ExportTrigger, succeeded: bool) -> u64 {
        let outcome = if succeeded { "ok" } else { "failed" };
        self.exports_total
            .with_label_values(&[trigger.as_str(), outcome])
            .get()
    }
}
