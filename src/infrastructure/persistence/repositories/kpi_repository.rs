use crate::domain::kpi::KpiSnapshot;
use crate::domain::repositories::KpiRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::PgPool;

/// Raw aggregate results; `None` wherever the view had no rows.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct KpiRow {
    pub hit_rate_pct: Option<Decimal>,
    pub eta_p50: Option<f64>,
    pub eta_p95: Option<f64>,
    pub active_clients: i64,
    pub routes_today: i64,
}

impl From<KpiRow> for KpiSnapshot {
    fn from(row: KpiRow) -> Self {
        Self {
            boarding_hit_rate_pct: row
                .hit_rate_pct
                .and_then(|d| d.round_dp(2).to_f64())
                .unwrap_or(0.0),
            eta_error_p50_s: floor_seconds(row.eta_p50),
            eta_error_p95_s: floor_seconds(row.eta_p95),
            active_clients: row.active_clients,
            routes_today: row.routes_today,
        }
    }
}

fn floor_seconds(value: Option<f64>) -> i64 {
    value
        .filter(|v| v.is_finite())
        .map(|v| v.floor() as i64)
        .unwrap_or(0)
}

/// Reads the KPI views through the read-only pool
pub struct PostgresKpiRepository {
    pool: PgPool,
}

impl PostgresKpiRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KpiRepository for PostgresKpiRepository {
    async fn fetch_snapshot(&self) -> Result<KpiSnapshot> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open KPI transaction")?;

        // One snapshot for all five reads so counts cannot drift apart
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .context("Failed to set KPI transaction isolation")?;

        let hit_rate_pct: Option<Decimal> = sqlx::query_scalar(
            "SELECT ROUND(AVG(hit_rate_pct)::numeric, 2) FROM view_boarding_window_hit_rate",
        )
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read boarding hit rate")?;

        let (eta_p50, eta_p95): (Option<f64>, Option<f64>) = sqlx::query_as(
            r#"
            WITH base AS (
                SELECT eta_error_seconds
                FROM view_eta_accuracy_seconds
                WHERE departure_time >= NOW() - INTERVAL '24 hours'
            )
            SELECT
                PERCENTILE_CONT(0.50) WITHIN GROUP (ORDER BY eta_error_seconds),
                PERCENTILE_CONT(0.95) WITHIN GROUP (ORDER BY eta_error_seconds)
            FROM base
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read ETA error percentiles")?;

        let active_clients: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM view_active_clients_geodata")
            .fetch_one(&mut *tx)
            .await
            .context("Failed to count active clients")?;

        let routes_today: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM view_daily_routing_summary
            WHERE created_at::date = NOW()::date
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count today's routes")?;

        tx.commit().await.context("Failed to close KPI transaction")?;

        Ok(KpiRow {
            hit_rate_pct,
            eta_p50,
            eta_p95,
            active_clients,
            routes_today,
        }
        .into())
    }
}
