//! Map-backed storage with JSON snapshots.
//!
//! Two persistence modes exist and are mutually exclusive:
//! - **Sync-write mode:** every successful mutation rewrites the
//!   snapshot file before the write call returns.
//! - **Interval mode:** a background loop rewrites the snapshot on
//!   each tick; mutations touch only memory.
//!
//! Snapshot writes go to a temp file first and are renamed into place,
//! so readers never observe a half-written snapshot. All file writes
//! happen while holding the same lock as the maps, which serializes
//! mutation and persistence.

use super::{MetricStorage, StorageError};
use async_trait::async_trait;
use metric_relay_core::{MetricKind, MetricPayload, MetricSnapshot};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Default)]
struct Partitions {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// In-memory metric store with optional snapshot persistence.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<Partitions>,
    snapshot_path: Option<PathBuf>,
    sync_writes: bool,
}

impl MemoryStorage {
    /// Volatile store without snapshots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that persists to `path`. With `sync_writes`, every
    /// mutation rewrites the snapshot; without it, only the save loop
    /// and `finalize` do.
    pub fn with_snapshot(path: impl Into<PathBuf>, sync_writes: bool) -> Self {
        Self {
            inner: RwLock::default(),
            snapshot_path: Some(path.into()),
            sync_writes,
        }
    }

    /// Load state from the snapshot file, replacing current contents.
    ///
    /// A missing file is an empty state. Malformed content is an
    /// error; restore runs at startup and the caller treats it as
    /// fatal.
    pub async fn load_snapshot(&self) -> Result<(), StorageError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no snapshot to restore");
                return Ok(());
            }
            Err(source) => {
                return Err(StorageError::Snapshot {
                    path: path.clone(),
                    source,
                })
            }
        };
        if raw.is_empty() {
            info!(path = %path.display(), "empty snapshot, starting fresh");
            return Ok(());
        }

        let snapshot: MetricSnapshot = serde_json::from_slice(&raw)?;

        let mut inner = self.inner.write().await;
        inner.gauges.clear();
        inner.counters.clear();
        for metric in snapshot.metrics {
            match metric.kind {
                MetricKind::Gauge => {
                    inner
                        .gauges
                        .insert(metric.id, metric.value.unwrap_or_default());
                }
                MetricKind::Counter => {
                    inner
                        .counters
                        .insert(metric.id, metric.delta.unwrap_or_default());
                }
            }
        }
        info!(
            path = %path.display(),
            gauges = inner.gauges.len(),
            counters = inner.counters.len(),
            "snapshot restored"
        );
        Ok(())
    }

    /// Spawn the interval-mode save loop. Stops, without a final
    /// write, when `shutdown` fires; `finalize` covers the last state.
    pub fn spawn_save_loop(
        self: &Arc<Self>,
        store_interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let storage = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + store_interval, store_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("interval snapshot");
                        let inner = storage.inner.read().await;
                        if let Err(err) = storage.write_snapshot(&inner).await {
                            error!(error = %err, "interval snapshot failed");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        debug!("save loop stopping");
                        return;
                    }
                }
            }
        })
    }

    async fn write_snapshot(
        &self,
        inner: &Partitions,
    ) -> Result<(), StorageError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let mut metrics: Vec<MetricPayload> = Vec::with_capacity(
            inner.gauges.len() + inner.counters.len(),
        );
        metrics.extend(
            inner
                .gauges
                .iter()
                .map(|(id, value)| MetricPayload::gauge(id.clone(), *value)),
        );
        metrics.extend(
            inner
                .counters
                .iter()
                .map(|(id, delta)| MetricPayload::counter(id.clone(), *delta)),
        );
        let data = serde_json::to_vec(&MetricSnapshot { metrics })?;

        let io_err = |source: std::io::Error| StorageError::Snapshot {
            path: path.clone(),
            source,
        };

        // Temp file plus rename keeps the snapshot whole at all times.
        let temp_path = snapshot_temp_path(path);
        fs::write(&temp_path, &data).await.map_err(io_err)?;
        fs::rename(&temp_path, path).await.map_err(io_err)?;
        Ok(())
    }

    async fn read(&self) -> RwLockReadGuard<'_, Partitions> {
        self.inner.read().await
    }
}

fn snapshot_temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

#[async_trait]
impl MetricStorage for MemoryStorage {
    async fn get_gauge(&self, name: &str) -> Result<Option<f64>, StorageError> {
        Ok(self.read().await.gauges.get(name).copied())
    }

    async fn get_counter(&self, name: &str) -> Result<Option<i64>, StorageError> {
        Ok(self.read().await.counters.get(name).copied())
    }

    async fn add_gauge(&self, name: &str, value: f64) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.gauges.insert(name.to_string(), value);
        if self.sync_writes {
            self.write_snapshot(&inner).await?;
        }
        Ok(())
    }

    async fn add_counter(&self, name: &str, delta: i64) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        *inner.counters.entry(name.to_string()).or_insert(0) += delta;
        if self.sync_writes {
            self.write_snapshot(&inner).await?;
        }
        Ok(())
    }

    async fn all_gauges(&self) -> Result<HashMap<String, f64>, StorageError> {
        Ok(self.read().await.gauges.clone())
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>, StorageError> {
        Ok(self.read().await.counters.clone())
    }

    async fn finalize(&self) -> Result<(), StorageError> {
        let inner = self.inner.read().await;
        self.write_snapshot(&inner).await
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
