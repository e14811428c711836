//! Collection and fan-out of report waves.
//!
//! Once per report interval the dispatcher snapshots the accumulator,
//! flattens it into metric payloads (gauges first, then counters),
//! splits those into chunks, and pushes the chunks onto a bounded
//! channel drained by a pool of sender workers. After the full wave is
//! enqueued the accumulator is reset; delivery is not awaited, so a
//! chunk that later exhausts its retries is dropped.
//!
//! The chunk channel capacity equals the worker count, which keeps the
//! single producer at most one wave's worth of chunks ahead of the
//! workers and bounds how long a shutdown drain can stall.

use crate::accumulator::MetricAccumulator;
use crate::sender::{ChunkSender, SendError};
use metric_relay_core::{run_with_retries, split_chunks, MetricPayload};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

// ============================================================================
// Configuration
// ============================================================================

/// Tuning knobs for the dispatch loop and its worker pool.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How often a wave is collected and sent.
    pub report_interval: Duration,

    /// Metrics per chunk.
    pub chunk_size: usize,

    /// Worker-pool size and chunk-channel capacity.
    pub rate_limit: usize,

    /// Per-chunk retry budget handed to the retry helper.
    pub max_request_retries: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(10),
            chunk_size: 10,
            rate_limit: 1,
            max_request_retries: 3,
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of one chunk delivery, reported on the results sink.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub worker_id: usize,
    pub metrics: usize,
    pub result: Result<(), SendError>,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Coordinates collection, chunking, fan-out, and cancellation.
pub struct Dispatcher {
    accumulator: Arc<MetricAccumulator>,
    sender: Arc<dyn ChunkSender>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        accumulator: Arc<MetricAccumulator>,
        sender: Arc<dyn ChunkSender>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            accumulator,
            sender,
            config,
        }
    }

    /// Run until `shutdown` fires, then drain one final wave, close the
    /// chunk channel, and join every worker.
    pub async fn run(&self, shutdown: CancellationToken) {
        let worker_count = self.config.rate_limit.max(1);
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<MetricPayload>>(worker_count);
        let chunk_rx = Arc::new(Mutex::new(chunk_rx));
        let (outcome_tx, outcome_rx) = mpsc::channel::<ChunkOutcome>(worker_count * 2);

        let workers: Vec<_> = (0..worker_count)
            .map(|worker_id| {
                let chunk_rx = Arc::clone(&chunk_rx);
                let sender = Arc::clone(&self.sender);
                let outcome_tx = outcome_tx.clone();
                let retries = self.config.max_request_retries;
                tokio::spawn(run_worker(worker_id, chunk_rx, sender, retries, outcome_tx))
            })
            .collect();
        // Workers hold the only remaining outcome senders; the sink
        // stops when the last worker exits.
        drop(outcome_tx);
        let sink = tokio::spawn(drain_outcomes(outcome_rx));

        let mut ticker = interval_at(
            Instant::now() + self.config.report_interval,
            self.config.report_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("report tick");
                    self.dispatch_wave(&chunk_tx).await;
                }
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, draining final wave");
                    self.dispatch_wave(&chunk_tx).await;
                    break;
                }
            }
        }

        drop(chunk_tx);
        for worker in workers {
            let _ = worker.await;
        }
        let _ = sink.await;
        info!("dispatcher stopped");
    }

    /// Flatten the accumulator into payloads: all gauges, then all
    /// counters.
    pub fn collect_all(&self) -> Vec<MetricPayload> {
        let gauges = self.accumulator.all_gauges();
        let counters = self.accumulator.all_counters();

        let mut metrics = Vec::with_capacity(gauges.len() + counters.len());
        metrics.extend(
            gauges
                .into_iter()
                .map(|(id, value)| MetricPayload::gauge(id, value)),
        );
        metrics.extend(
            counters
                .into_iter()
                .map(|(id, delta)| MetricPayload::counter(id, delta)),
        );
        metrics
    }

    async fn dispatch_wave(&self, chunk_tx: &mpsc::Sender<Vec<MetricPayload>>) {
        let metrics = self.collect_all();
        if metrics.is_empty() {
            debug!("nothing accumulated, skipping wave");
            return;
        }

        let chunks = split_chunks(self.config.chunk_size, metrics);
        let enqueued = chunks.len();
        for chunk in chunks {
            if chunk_tx.send(chunk).await.is_err() {
                error!("chunk channel closed mid-wave");
                return;
            }
        }

        // Reset happens once the wave is enqueued, not once it is
        // confirmed; a chunk that exhausts its retries is lost.
        self.accumulator.reset();
        debug!(chunks = enqueued, "wave enqueued, accumulator reset");
    }
}

// ============================================================================
// Worker Pool
// ============================================================================

async fn run_worker(
    worker_id: usize,
    chunk_rx: Arc<Mutex<mpsc::Receiver<Vec<MetricPayload>>>>,
    sender: Arc<dyn ChunkSender>,
    retries: u32,
    outcome_tx: mpsc::Sender<ChunkOutcome>,
) {
    loop {
        let chunk = { chunk_rx.lock().await.recv().await };
        let Some(chunk) = chunk else {
            debug!(worker_id, "chunk channel drained, worker exiting");
            return;
        };

        let result = run_with_retries(
            "deliver metrics chunk",
            retries,
            || sender.send_chunk(worker_id, &chunk),
            SendError::is_retriable,
        )
        .await;

        let outcome = ChunkOutcome {
            worker_id,
            metrics: chunk.len(),
            result,
        };
        if outcome_tx.send(outcome).await.is_err() {
            return;
        }
    }
}

async fn drain_outcomes(mut outcome_rx: mpsc::Receiver<ChunkOutcome>) {
    let mut delivered = 0usize;
    let mut lost = 0usize;

    while let Some(outcome) = outcome_rx.recv().await {
        match outcome.result {
            Ok(()) => {
                delivered += 1;
                debug!(
                    worker_id = outcome.worker_id,
                    metrics = outcome.metrics,
                    "chunk delivered"
                );
            }
            Err(err) => {
                lost += 1;
                error!(
                    worker_id = outcome.worker_id,
                    metrics = outcome.metrics,
                    error = %err,
                    "chunk lost after exhausting retries"
                );
            }
        }
    }

    info!(delivered, lost, "delivery totals");
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
