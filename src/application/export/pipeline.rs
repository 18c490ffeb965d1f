use crate::config::ExportEnvConfig;
use crate::domain::errors::ExportError;
use crate::domain::kpi::{KpiSnapshot, TimeBucket};
use crate::domain::ports::MetricSink;
use crate::domain::repositories::KpiRepository;
use crate::infrastructure::observability::{ExporterMetrics, LineProtocolEncoder};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What caused an export cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportTrigger {
    /// A newly guarded change event
    Reactive,
    /// The periodic safety cadence
    Safety,
    /// A one-off run requested from the command line
    Manual,
}

impl ExportTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportTrigger::Reactive => "reactive",
            ExportTrigger::Safety => "safety",
            ExportTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for ExportTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a delivered export
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub trigger: ExportTrigger,
    pub bucket: TimeBucket,
    pub snapshot: KpiSnapshot,
}

/// Aggregate → encode → emit, shared by every trigger
pub struct ExportPipeline {
    kpis: Arc<dyn KpiRepository>,
    sink: Arc<dyn MetricSink>,
    encoder: LineProtocolEncoder,
    bucket_width: Duration,
    metrics: ExporterMetrics,
}

impl ExportPipeline {
    pub fn new(
        kpis: Arc<dyn KpiRepository>,
        sink: Arc<dyn MetricSink>,
        config: &ExportEnvConfig,
        metrics: ExporterMetrics,
    ) -> Self {
        Self {
            kpis,
            sink,
            encoder: LineProtocolEncoder::new(&config.mode),
            bucket_width: config.bucket_width,
            metrics,
        }
    }

    /// Run one export cycle. A failed KPI read emits nothing.
    pub async fn export(&self, trigger: ExportTrigger) -> Result<ExportReport, ExportError> {
        let result = self.run(trigger).await;
        self.metrics.record_export(trigger, result.is_ok());
        if let Ok(report) = &result {
            self.metrics.last_export_bucket_ns.set(report.bucket.as_nanos());
        }
        result
    }

    async fn run(&self, trigger: ExportTrigger) -> Result<ExportReport, ExportError> {
        let snapshot = self
            .kpis
            .fetch_snapshot()
            .await
            .map_err(ExportError::Aggregation)?;

        let bucket = TimeBucket::now(self.bucket_width);
        let payload = self.encoder.encode(&snapshot, bucket);
        self.sink.emit(&payload).await?;

        Ok(ExportReport {
            trigger,
            bucket,
            snapshot,
        })
    }
}
