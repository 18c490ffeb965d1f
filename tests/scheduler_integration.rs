use kpi_exporter::application::export::{ExportPipeline, ExportScheduler, ExportTrigger};
use kpi_exporter::config::ExportEnvConfig;
use kpi_exporter::domain::errors::ListenerError;
use kpi_exporter::domain::kpi::KpiSnapshot;
use kpi_exporter::infrastructure::InMemoryExportGuard;
use kpi_exporter::infrastructure::mock::{ChannelEventSource, MockKpiRepository, RecordingSink};
use kpi_exporter::infrastructure::observability::ExporterMetrics;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

struct Running {
    events: mpsc::Sender<String>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<(), ListenerError>>,
    kpis: Arc<MockKpiRepository>,
    sink: Arc<RecordingSink>,
    metrics: ExporterMetrics,
    closed: Arc<AtomicBool>,
}

fn snapshot() -> KpiSnapshot {
    KpiSnapshot {
        boarding_hit_rate_pct: 93.21,
        eta_error_p50_s: 12,
        eta_error_p95_s: 47,
        active_clients: 5,
        routes_today: 3,
    }
}

fn payload(entity_id: i64) -> String {
    format!(
        r#"{{"entity_id": {}, "client_id": 1, "session_id": 2, "created_at": "2026-01-01T00:00:00"}}"#,
        entity_id
    )
}

/// Queue `initial` payloads, then start the scheduler.
async fn start(config: ExportEnvConfig, initial: Vec<String>) -> Running {
    let metrics = ExporterMetrics::new().unwrap();
    let kpis = Arc::new(MockKpiRepository::new(snapshot()));
    let sink = Arc::new(RecordingSink::new());
    let (events, source) = ChannelEventSource::channel(64, metrics.clone());
    let closed = source.closed_flag();

    for p in initial {
        events.send(p).await.unwrap();
    }

    let pipeline = ExportPipeline::new(kpis.clone(), sink.clone(), &config, metrics.clone());
    let scheduler = ExportScheduler::new(
        Box::new(source),
        Arc::new(InMemoryExportGuard::new()),
        pipeline,
        &config,
        metrics.clone(),
    );

    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    Running {
        events,
        shutdown,
        handle,
        kpis,
        sink,
        metrics,
        closed,
    }
}

fn config(safety_secs: u64, debounce_secs: u64) -> ExportEnvConfig {
    ExportEnvConfig {
        safety_interval: Duration::from_secs(safety_secs),
        debounce: Duration::from_secs(debounce_secs),
        poll_interval: Duration::from_secs(1),
        ..ExportEnvConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_events_collapses_into_one_export() {
    let run = start(
        config(3600, 5),
        vec![payload(1), payload(2), payload(3), payload(1)],
    )
    .await;

    sleep(Duration::from_secs(10)).await;

    // One startup safety push plus exactly one reactive export
    assert_eq!(run.metrics.export_count(ExportTrigger::Safety, true), 1);
    assert_eq!(run.metrics.export_count(ExportTrigger::Reactive, true), 1);
    assert_eq!(run.kpis.calls(), 2);
    assert_eq!(run.sink.payloads().await.len(), 2);
    assert_eq!(run.metrics.events_received_total.get(), 4);
    assert_eq!(run.metrics.events_duplicate_total.get(), 1);

    run.shutdown.send(true).unwrap();
    run.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_new_event_while_pending_pushes_due_time_back() {
    let run = start(config(3600, 5), vec![payload(10)]).await;

    sleep(Duration::from_millis(3500)).await;
    run.events.send(payload(11)).await.unwrap();

    // First event alone would have fired around t=5s
    sleep(Duration::from_secs(3)).await;
    assert_eq!(run.metrics.export_count(ExportTrigger::Reactive, true), 0);

    sleep(Duration::from_secs(4)).await;
    assert_eq!(run.metrics.export_count(ExportTrigger::Reactive, true), 1);

    run.shutdown.send(true).unwrap();
    run.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_already_exported_entity_never_triggers_again() {
    let run = start(config(3600, 0), vec![payload(7)]).await;

    sleep(Duration::from_secs(3)).await;
    assert_eq!(run.metrics.export_count(ExportTrigger::Reactive, true), 1);

    run.events.send(payload(7)).await.unwrap();
    sleep(Duration::from_secs(3)).await;
    assert_eq!(run.metrics.export_count(ExportTrigger::Reactive, true), 1);
    assert_eq!(run.metrics.events_duplicate_total.get(), 1);

    run.shutdown.send(true).unwrap();
    run.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_safety_push_runs_without_any_events() {
    let run = start(config(10, 0), vec![]).await;

    sleep(Duration::from_secs(35)).await;

    // Pushes at roughly t=1, 11, 21 and 31
    assert_eq!(run.metrics.export_count(ExportTrigger::Safety, true), 4);
    assert_eq!(run.metrics.export_count(ExportTrigger::Reactive, true), 0);
    assert_eq!(run.metrics.events_received_total.get(), 0);

    let payloads = run.sink.payloads().await;
    assert_eq!(payloads.len(), 4);
    assert!(payloads[0].starts_with("uos_kpi boarding_hit_rate_pct=93.21 "));

    run.shutdown.send(true).unwrap();
    run.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failing_sink_is_not_hammered() {
    let run = start(config(10, 0), vec![]).await;
    run.sink.set_failing(true);

    sleep(Duration::from_secs(25)).await;

    // One attempt per safety interval, not one per poll
    assert_eq!(run.sink.attempts(), 3);
    assert_eq!(run.metrics.export_count(ExportTrigger::Safety, false), 3);

    run.sink.set_failing(false);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(run.metrics.export_count(ExportTrigger::Safety, true), 1);

    run.shutdown.send(true).unwrap();
    run.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_aggregation_failure_skips_emission() {
    let run = start(config(3600, 0), vec![]).await;
    run.kpis.set_failing(true);

    sleep(Duration::from_secs(2)).await;
    run.events.send(payload(20)).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(run.kpis.calls(), 2);
    assert_eq!(run.sink.attempts(), 0);
    assert_eq!(run.metrics.export_count(ExportTrigger::Reactive, false), 1);

    run.shutdown.send(true).unwrap();
    run.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payload_does_not_stop_the_loop() {
    let run = start(
        config(3600, 0),
        vec!["{\"entity_id\": ".to_string(), r#"{"client_id": 5}"#.to_string()],
    )
    .await;

    sleep(Duration::from_secs(2)).await;
    run.events.send(payload(30)).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(run.metrics.payloads_malformed_total.get(), 2);
    assert_eq!(run.metrics.events_received_total.get(), 1);
    assert_eq!(run.metrics.export_count(ExportTrigger::Reactive, true), 1);
    assert!(!run.handle.is_finished());

    run.shutdown.send(true).unwrap();
    run.handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_subscription() {
    let run = start(config(3600, 0), vec![]).await;
    sleep(Duration::from_secs(2)).await;
    assert!(!run.closed.load(Ordering::SeqCst));

    run.shutdown.send(true).unwrap();
    let result = run.handle.await.unwrap();

    assert!(result.is_ok());
    assert!(run.closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_ended_subscription_stops_scheduler_with_error() {
    let run = start(config(3600, 0), vec![]).await;
    sleep(Duration::from_secs(2)).await;

    drop(run.events);
    let result = run.handle.await.unwrap();

    assert!(matches!(result, Err(ListenerError::Closed)));
    drop(run.shutdown);
}

#[tokio::test(start_paused = true)]
async fn test_each_export_reads_a_fresh_snapshot() {
    let run = start(config(10, 0), vec![]).await;

    sleep(Duration::from_secs(5)).await;
    run.kpis
        .set_snapshot(KpiSnapshot {
            routes_today: 9,
            ..snapshot()
        })
        .await;
    sleep(Duration::from_secs(10)).await;

    let payloads = run.sink.payloads().await;
    assert_eq!(payloads.len(), 2);
    assert!(payloads[0].contains("routes_today=3i "));
    assert!(payloads[1].contains("routes_today=9i "));

    run.shutdown.send(true).unwrap();
    run.handle.await.unwrap().unwrap();
}
