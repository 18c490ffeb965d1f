//! Repository Pattern Abstractions
//!
//! Storage-facing traits used by the export pipeline:
//! - `ExportGuardRepository`: durable at-most-once marker per exported entity
//! - `KpiRepository`: read-only KPI aggregation
//!
//! PostgreSQL implementations live in `infrastructure::persistence`; the
//! in-memory guard in `infrastructure::repositories` backs tests and dry runs.

use crate::domain::kpi::KpiSnapshot;
use anyhow::Result;
use async_trait::async_trait;

/// Durable dedup record keyed by entity id
#[async_trait]
pub trait ExportGuardRepository: Send + Sync {
    /// Atomically record `entity_id` as exported.
    ///
    /// Returns `true` only for the single caller whose insert created the
    /// record; every later or concurrent caller gets `false`.
    async fn try_mark_exported(&self, entity_id: i64) -> Result<bool>;
}

/// Source of KPI snapshots
#[async_trait]
pub trait KpiRepository: Send + Sync {
    /// Read all KPIs from a single consistent snapshot of the store.
    async fn fetch_snapshot(&self) -> Result<KpiSnapshot>;
}
