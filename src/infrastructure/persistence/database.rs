use crate::config::DatabaseEnvConfig;
use anyhow::{Context, Result, bail};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// Read-write and read-only pools, held for the lifetime of the daemon
#[derive(Clone)]
pub struct Database {
    /// Schema installation and guard inserts
    pub rw: PgPool,
    /// KPI reads and the notification subscription
    pub ro: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseEnvConfig) -> Result<Self> {
        let rw = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.rw_url)
            .await
            .context("Failed to connect to read-write database")?;

        // The listener pins one connection for its lifetime, so the read-only
        // pool always gets room for a KPI read next to it.
        let ro = PgPoolOptions::new()
            .max_connections(config.max_connections.max(2))
            .connect(config.read_only_url())
            .await
            .context("Failed to connect to read-only database")?;

        info!(
            "Connected to database (read-only DSN {})",
            if config.ro_url.is_some() { "set" } else { "shared with read-write" }
        );

        Ok(Self { rw, ro })
    }

    /// Install the notify trigger and the guard table. Safe to run on every
    /// startup.
    pub async fn install_schema(&self, channel: &str) -> Result<()> {
        if channel.is_empty()
            || !channel
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            bail!("Notification channel '{}' must be a plain identifier", channel);
        }

        let mut conn = self.rw.acquire().await?;

        sqlx::raw_sql(&notify_function_sql(channel))
            .execute(&mut *conn)
            .await
            .context("Failed to create notify function")?;

        sqlx::raw_sql(
            r#"
            DROP TRIGGER IF EXISTS trg_trajectory_insert_notify ON trajectories;
            CREATE TRIGGER trg_trajectory_insert_notify
            AFTER INSERT ON trajectories
            FOR EACH ROW
            EXECUTE FUNCTION uos_notify_trajectory_insert();
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create insert trigger")?;

        sqlx::raw_sql(GUARD_TABLE_SQL)
            .execute(&mut *conn)
            .await
            .context("Failed to create metrics_export_guard table")?;

        info!("Notify trigger and export guard installed (channel {}).", channel);
        Ok(())
    }

    pub async fn close(&self) {
        self.ro.close().await;
        self.rw.close().await;
        info!("Database pools closed.");
    }
}

/// Guard table DDL. The key column keeps its historical name
/// `trajectory_id` so tables created by earlier deployments stay usable.
pub const GUARD_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS metrics_export_guard (
    trajectory_id BIGINT PRIMARY KEY,
    exported_at   TIMESTAMP DEFAULT NOW()
);
"#;

fn notify_function_sql(channel: &str) -> String {
    format!(
        r#"
        CREATE OR REPLACE FUNCTION uos_notify_trajectory_insert() RETURNS trigger AS $$
        BEGIN
          PERFORM pg_notify(
            '{channel}',
            json_build_object(
              'entity_id',  NEW.id,
              'client_id',  NEW.client_id,
              'session_id', NEW.session_id,
              'created_at', NEW.created_at
            )::text
          );
          RETURN NEW;
        END;
        $$ LANGUAGE plpgsql;
        "#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_function_targets_channel() {
        let sql = notify_function_sql("kpi_ready");
        assert!(sql.contains("pg_notify("));
        assert!(sql.contains("'kpi_ready',"));
        assert!(sql.contains("'entity_id',  NEW.id"));
        assert!(sql.contains("CREATE OR REPLACE FUNCTION"));
    }

    #[test]
    fn test_guard_table_keeps_trajectory_id_column() {
        assert!(GUARD_TABLE_SQL.contains("CREATE TABLE IF NOT EXISTS metrics_export_guard"));
        assert!(GUARD_TABLE_SQL.contains("trajectory_id BIGINT PRIMARY KEY"));
        assert!(!GUARD_TABLE_SQL.contains("entity_id"));
    }
}
