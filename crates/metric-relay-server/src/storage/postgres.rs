//! PostgreSQL-backed storage.
//!
//! One row per `(metric_id, metric_type)` pair. The metric semantics
//! live in the upsert statements: gauges replace their value on
//! conflict, counters add the incoming delta to the stored one, both
//! in a single statement so concurrent writers cannot interleave a
//! read-modify-write.

use super::{MetricStorage, StorageError};
use async_trait::async_trait;
use metric_relay_core::run_with_retries;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

/// Attempts beyond the first when acquiring the initial connection.
const CONNECT_RETRIES: u32 = 3;

/// Deadline for connection-time pings.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Metric store on a pooled PostgreSQL connection.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to `dsn`, retrying transient failures.
    ///
    /// Every connect error is treated as retriable; the database is
    /// routinely the last thing to come up in a fresh deployment.
    pub async fn connect(dsn: &str) -> Result<Self, StorageError> {
        let pool = run_with_retries(
            "connect to database",
            CONNECT_RETRIES,
            || {
                PgPoolOptions::new()
                    .acquire_timeout(CONNECT_TIMEOUT)
                    .connect(dsn)
            },
            |_| true,
        )
        .await?;

        info!("database connection established");
        Ok(Self { pool })
    }

    /// Apply the embedded migrations.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("migrations applied");
        Ok(())
    }

    /// One-shot reachability check with the connect deadline, used by
    /// the `/ping` endpoint.
    pub async fn ping(dsn: &str) -> Result<(), StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(dsn)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MetricStorage for PostgresStorage {
    async fn get_gauge(&self, name: &str) -> Result<Option<f64>, StorageError> {
        let row: Option<(f64,)> = sqlx::query_as(
            "SELECT value FROM metric WHERE metric_type = 'gauge' AND metric_id = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn get_counter(&self, name: &str) -> Result<Option<i64>, StorageError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT delta FROM metric WHERE metric_type = 'counter' AND metric_id = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(delta,)| delta))
    }

    async fn add_gauge(&self, name: &str, value: f64) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO metric (metric_type, metric_id, value) VALUES ('gauge', $1, $2) \
             ON CONFLICT (metric_id, metric_type) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_counter(&self, name: &str, delta: i64) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO metric (metric_type, metric_id, delta) VALUES ('counter', $1, $2) \
             ON CONFLICT (metric_id, metric_type) DO UPDATE SET delta = metric.delta + EXCLUDED.delta",
        )
        .bind(name)
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn all_gauges(&self) -> Result<HashMap<String, f64>, StorageError> {
        let rows: Vec<(String, f64)> =
            sqlx::query_as("SELECT metric_id, value FROM metric WHERE metric_type = 'gauge'")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>, StorageError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT metric_id, delta FROM metric WHERE metric_type = 'counter'")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// Rows are already durable; nothing to flush.
    async fn finalize(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "postgres_tests.rs"]
mod tests;
