//! Periodic samplers feeding the accumulator.
//!
//! Two independent loops run at the poll interval: the runtime sampler
//! reports the agent process's memory picture plus `PollCount` and
//! `RandomValue`, the system sampler reports host memory and per-CPU
//! utilization. Both stop after their in-flight iteration when the
//! shutdown token fires; neither ever blocks the dispatcher.

use crate::accumulator::MetricAccumulator;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{get_current_pid, Pid, System};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Spawn the runtime sampler loop.
pub fn spawn_runtime_sampler(
    accumulator: Arc<MetricAccumulator>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sampler = RuntimeSampler::new();
        let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("sampling runtime metrics");
                    sampler.sample(&accumulator);
                }
                _ = shutdown.cancelled() => {
                    debug!("runtime sampler stopping");
                    return;
                }
            }
        }
    })
}

/// Spawn the system sampler loop.
pub fn spawn_system_sampler(
    accumulator: Arc<MetricAccumulator>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sampler = SystemSampler::new();
        let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("sampling system metrics");
                    sampler.sample(&accumulator);
                }
                _ = shutdown.cancelled() => {
                    debug!("system sampler stopping");
                    return;
                }
            }
        }
    })
}

// ============================================================================
// Runtime Sampler
// ============================================================================

/// Samples the agent process itself.
///
/// The gauge names form the fixed cross-process contract. The values
/// come from the closest process-level quantity the OS exposes:
/// resident set for the allocator-in-use family, virtual size for the
/// reserved family, and a running resident-set total for `TotalAlloc`.
/// Allocator-internal and GC counters have no equivalent here and are
/// reported as zero so the gauge set stays fully populated.
pub(crate) struct RuntimeSampler {
    sys: System,
    pid: Option<Pid>,
    total_alloc: f64,
}

impl RuntimeSampler {
    pub(crate) fn new() -> Self {
        let pid = match get_current_pid() {
            Ok(pid) => Some(pid),
            Err(reason) => {
                warn!(reason, "cannot resolve own pid, process gauges will read zero");
                None
            }
        };
        Self {
            sys: System::new(),
            pid,
            total_alloc: 0.0,
        }
    }

    pub(crate) fn sample(&mut self, accumulator: &MetricAccumulator) {
        let (resident, virtual_size) = self.process_memory();
        let idle = (virtual_size - resident).max(0.0);
        self.total_alloc += resident;

        let gauges = [
            ("Alloc", resident),
            ("BuckHashSys", 0.0),
            ("Frees", 0.0),
            ("GCCPUFraction", 0.0),
            ("GCSys", 0.0),
            ("HeapAlloc", resident),
            ("HeapIdle", idle),
            ("HeapInuse", resident),
            ("HeapObjects", 0.0),
            ("HeapReleased", 0.0),
            ("HeapSys", virtual_size),
            ("LastGC", 0.0),
            ("Lookups", 0.0),
            ("MCacheInuse", 0.0),
            ("MCacheSys", 0.0),
            ("MSpanInuse", 0.0),
            ("MSpanSys", 0.0),
            ("Mallocs", 0.0),
            ("NextGC", 0.0),
            ("NumForcedGC", 0.0),
            ("NumGC", 0.0),
            ("OtherSys", 0.0),
            ("PauseTotalNs", 0.0),
            ("StackInuse", 0.0),
            ("StackSys", 0.0),
            ("Sys", virtual_size),
            ("TotalAlloc", self.total_alloc),
        ];

        for (name, value) in gauges {
            accumulator.add_gauge(name, value);
        }

        accumulator.add_gauge("RandomValue", rand::thread_rng().gen::<f64>());
        accumulator.add_counter("PollCount", 1);
    }

    fn process_memory(&mut self) -> (f64, f64) {
        let Some(pid) = self.pid else {
            return (0.0, 0.0);
        };
        if !self.sys.refresh_process(pid) {
            warn!(%pid, "own process vanished from the process table");
            return (0.0, 0.0);
        }
        match self.sys.process(pid) {
            Some(process) => (process.memory() as f64, process.virtual_memory() as f64),
            None => (0.0, 0.0),
        }
    }
}

// ============================================================================
// System Sampler
// ============================================================================

/// Samples host-wide memory and per-CPU utilization.
///
/// CPU numbering in gauge names starts at 1 (`CPUutilization1`). The
/// first tick after startup reports zero utilization because usage is
/// computed between consecutive refreshes.
pub(crate) struct SystemSampler {
    sys: System,
}

impl SystemSampler {
    pub(crate) fn new() -> Self {
        Self { sys: System::new() }
    }

    pub(crate) fn sample(&mut self, accumulator: &MetricAccumulator) {
        self.sys.refresh_memory();
        accumulator.add_gauge("TotalMemory", self.sys.total_memory() as f64);
        accumulator.add_gauge("FreeMemory", self.sys.free_memory() as f64);

        self.sys.refresh_cpu_usage();
        for (i, cpu) in self.sys.cpus().iter().enumerate() {
            accumulator.add_gauge(&format!("CPUutilization{}", i + 1), cpu.cpu_usage() as f64);
        }
    }
}

#[cfg(test)]
#[path = "sampler_tests.rs"]
mod tests;
