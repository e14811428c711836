//! Storage backends behind one uniform contract.
//!
//! Handlers and the gRPC service talk to [`MetricStorage`] only; the
//! concrete backend (in-memory with snapshots, or PostgreSQL) is
//! chosen once at startup from configuration.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

/// Uniform read/write/finalize contract shared by both backends.
///
/// Reads map "unknown metric" to `Ok(None)`; absence is a normal
/// outcome, not an error. `finalize` runs once at shutdown after
/// in-flight writes have drained.
#[async_trait]
pub trait MetricStorage: Send + Sync {
    async fn get_gauge(&self, name: &str) -> Result<Option<f64>, StorageError>;
    async fn get_counter(&self, name: &str) -> Result<Option<i64>, StorageError>;
    async fn add_gauge(&self, name: &str, value: f64) -> Result<(), StorageError>;
    async fn add_counter(&self, name: &str, delta: i64) -> Result<(), StorageError>;
    async fn all_gauges(&self) -> Result<HashMap<String, f64>, StorageError>;
    async fn all_counters(&self) -> Result<HashMap<String, i64>, StorageError>;
    async fn finalize(&self) -> Result<(), StorageError>;
}

/// Infrastructure-level storage failures; handlers translate these to
/// 500 responses.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("snapshot I/O failed at {path}: {source}")]
    Snapshot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("snapshot encoding failed: {0}")]
    SnapshotEncoding(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
