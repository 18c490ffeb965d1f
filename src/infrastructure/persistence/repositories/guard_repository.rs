use crate::domain::repositories::ExportGuardRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

/// Insert-if-absent on the guard key column (see `GUARD_TABLE_SQL`)
const GUARD_INSERT_SQL: &str = r#"
    INSERT INTO metrics_export_guard (trajectory_id)
    VALUES ($1)
    ON CONFLICT DO NOTHING
"#;

pub struct PostgresExportGuardRepository {
    pool: PgPool,
}

impl PostgresExportGuardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExportGuardRepository for PostgresExportGuardRepository {
    /// Insert-if-absent; the primary key decides the winner across processes.
    async fn try_mark_exported(&self, entity_id: i64) -> Result<bool> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for guard insert")?;

        let result = sqlx::query(GUARD_INSERT_SQL)
            .bind(entity_id)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to insert export guard for entity {}", entity_id))?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::database::GUARD_TABLE_SQL;

    #[test]
    fn test_insert_targets_guard_key_column() {
        assert!(GUARD_INSERT_SQL.contains("metrics_export_guard (trajectory_id)"));
        assert!(GUARD_TABLE_SQL.contains("trajectory_id BIGINT PRIMARY KEY"));
        assert!(GUARD_INSERT_SQL.contains("ON CONFLICT DO NOTHING"));
    }
}
