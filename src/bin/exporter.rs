//! KPI Exporter - reactive metrics export daemon
//!
//! Listens for trajectory inserts on a PostgreSQL channel, deduplicates them
//! against the export guard table and pushes the KPI snapshot to InfluxDB,
//! both on notification and on a fixed safety cadence.
//!
//! # Usage
//! ```sh
//! INFLUX_URL=http://influx:8086/api/v2/write?org=uos&bucket=kpi INFLUX_TOKEN=... cargo run
//! ```
//!
//! # Environment Variables
//! - `INFLUX_URL`, `INFLUX_TOKEN` - Sink endpoint and token (required)
//! - `POSTGRES_DSN_RW`, `POSTGRES_DSN_RO` - Store connection strings
//! - `ANON_MODE` - Omit deployment tags (default: true)
//! - `BUCKET_SECONDS` - Timestamp bucket width (default: 60)
//! - `SAFETY_PUSH_EVERY_SEC` - Safety export interval (default: 600)

use anyhow::{Context, Result};
use clap::Parser;
use kpi_exporter::application::export::{ExportPipeline, ExportScheduler, ExportTrigger};
use kpi_exporter::config::Config;
use kpi_exporter::domain::ports::MetricSink;
use kpi_exporter::domain::repositories::{ExportGuardRepository, KpiRepository};
use kpi_exporter::infrastructure::InMemoryExportGuard;
use kpi_exporter::infrastructure::observability::{ExporterMetrics, InfluxSink, StdoutSink};
use kpi_exporter::infrastructure::persistence::repositories::{
    PostgresExportGuardRepository, PostgresKpiRepository,
};
use kpi_exporter::infrastructure::persistence::{Database, PgChangeEventSource};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Reactive KPI exporter for InfluxDB", long_about = None)]
struct Cli {
    /// Run a single export and exit
    #[arg(long)]
    once: bool,

    /// Print payloads to stdout instead of posting them; guard records stay in memory
    #[arg(long)]
    dry_run: bool,

    /// Do not install the notify trigger and guard table
    #[arg(long)]
    skip_install: bool,
}

impl Cli {
    /// Dry runs print payloads on stdout, so logs move to stderr
    fn logs_to_stderr(&self) -> bool {
        self.dry_run
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let writer = if cli.logs_to_stderr() {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(fmt_layer)
        .init();

    info!("KPI Exporter {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        "Configuration loaded: Mode={:?}, Bucket={:?}, Safety={:?}, Channel={}",
        config.export.mode,
        config.export.bucket_width,
        config.export.safety_interval,
        config.database.notify_channel
    );

    let metrics = ExporterMetrics::new()?;
    let database = Database::connect(&config.database).await?;

    if cli.skip_install || cli.dry_run {
        info!("Schema installation skipped.");
    } else {
        database.install_schema(&config.database.notify_channel).await?;
    }

    let sink: Arc<dyn MetricSink> = if cli.dry_run {
        info!("Dry run: payloads go to stdout.");
        Arc::new(StdoutSink)
    } else {
        Arc::new(InfluxSink::new(&config.sink)?)
    };
    let kpis: Arc<dyn KpiRepository> = Arc::new(PostgresKpiRepository::new(database.ro.clone()));
    let pipeline = ExportPipeline::new(kpis, sink, &config.export, metrics.clone());

    if cli.once {
        let result = pipeline.export(ExportTrigger::Manual).await;
        database.close().await;
        let report = result?;
        info!("Export OK (bucket {}): {:?}", report.bucket, report.snapshot);
        return Ok(());
    }

    let guard: Arc<dyn ExportGuardRepository> = if cli.dry_run {
        Arc::new(InMemoryExportGuard::new())
    } else {
        Arc::new(PostgresExportGuardRepository::new(database.rw.clone()))
    };

    let source =
        PgChangeEventSource::subscribe(&database.ro, &config.database.notify_channel, metrics.clone())
            .await?;

    let scheduler = ExportScheduler::new(
        Box::new(source),
        guard,
        pipeline,
        &config.export,
        metrics.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(scheduler.run(shutdown_rx));

    info!("Exporter running. Press Ctrl+C to shutdown.");

    let joined = tokio::select! {
        joined = &mut handle => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!("Shutdown signal received. Stopping scheduler...");
                    let _ = shutdown_tx.send(true);
                }
                Err(e) => warn!("Failed to listen for shutdown signal: {}. Running until the scheduler stops.", e),
            }
            handle.await
        }
    };

    database.close().await;
    debug!("Exporter metrics at shutdown:\n{}", metrics.render());
    info!(
        "Exports: reactive ok={} failed={}, safety ok={} failed={}",
        metrics.export_count(ExportTrigger::Reactive, true),
        metrics.export_count(ExportTrigger::Reactive, false),
        metrics.export_count(ExportTrigger::Safety, true),
        metrics.export_count(ExportTrigger::Safety, false),
    );

    joined.context("Scheduler task panicked")??;
    info!("Shutdown complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_keeps_stdout_for_payloads() {
        let cli = Cli::try_parse_from(["kpi-exporter", "--dry-run"]).unwrap();
        assert!(cli.dry_run);
        assert!(cli.logs_to_stderr());

        let cli = Cli::try_parse_from(["kpi-exporter", "--once"]).unwrap();
        assert!(cli.once);
        assert!(!cli.logs_to_stderr());
    }
}
