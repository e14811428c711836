//! Tests for the dispatcher

use super::*;
use crate::sender::MockChunkSender;
use metric_relay_core::MetricKind;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;

fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        report_interval: Duration::from_secs(3600),
        chunk_size: 2,
        rate_limit: 1,
        max_request_retries: 0,
    }
}

#[test]
fn test_collect_all_orders_gauges_before_counters() {
    let accumulator = Arc::new(MetricAccumulator::new());
    accumulator.add_gauge("g1", 3.14);
    accumulator.add_gauge("g2", 1.0);
    accumulator.add_counter("c1", 100);

    let dispatcher = Dispatcher::new(
        accumulator,
        Arc::new(MockChunkSender::new()),
        test_config(),
    );

    let metrics = dispatcher.collect_all();
    assert_eq!(metrics.len(), 3);

    let first_counter = metrics
        .iter()
        .position(|m| m.kind == MetricKind::Counter)
        .unwrap();
    assert!(metrics[..first_counter]
        .iter()
        .all(|m| m.kind == MetricKind::Gauge));

    let g1 = metrics.iter().find(|m| m.id == "g1").unwrap();
    assert_eq!(g1.value, Some(3.14));
    let c1 = metrics.iter().find(|m| m.id == "c1").unwrap();
    assert_eq!(c1.delta, Some(100));
}

#[tokio::test(start_paused = true)]
async fn test_tick_wave_is_chunked_and_accumulator_reset() {
    let accumulator = Arc::new(MetricAccumulator::new());
    for i in 0..5 {
        accumulator.add_gauge(&format!("g{i}"), i as f64);
    }

    let chunks: Arc<StdMutex<Vec<Vec<MetricPayload>>>> = Arc::default();
    let recorded = Arc::clone(&chunks);

    let mut sender = MockChunkSender::new();
    sender
        .expect_send_chunk()
        .times(3)
        .returning(move |_, chunk| {
            recorded.lock().unwrap().push(chunk.to_vec());
            Ok(())
        });

    let config = DispatcherConfig {
        report_interval: Duration::from_secs(1),
        ..test_config()
    };
    let dispatcher = Dispatcher::new(Arc::clone(&accumulator), Arc::new(sender), config);

    let shutdown = CancellationToken::new();
    let worker_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move { dispatcher.run(worker_shutdown).await });

    // Let one report tick fire.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    shutdown.cancel();
    handle.await.unwrap();

    let chunks = chunks.lock().unwrap();
    assert_eq!(chunks.len(), 3);
    let mut sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 2, 2]);

    assert!(accumulator.all_gauges().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_drains_one_final_wave() {
    let accumulator = Arc::new(MetricAccumulator::new());
    accumulator.add_counter("PollCount", 4);

    let chunks: Arc<StdMutex<Vec<Vec<MetricPayload>>>> = Arc::default();
    let recorded = Arc::clone(&chunks);

    let mut sender = MockChunkSender::new();
    sender
        .expect_send_chunk()
        .times(1)
        .returning(move |_, chunk| {
            recorded.lock().unwrap().push(chunk.to_vec());
            Ok(())
        });

    let dispatcher = Dispatcher::new(Arc::clone(&accumulator), Arc::new(sender), test_config());

    // Cancel before the (hour-long) first tick: only the drain wave runs.
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    dispatcher.run(shutdown).await;

    let chunks = chunks.lock().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0][0].id, "PollCount");
    assert!(accumulator.all_counters().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_loses_chunk_but_wave_completes() {
    let accumulator = Arc::new(MetricAccumulator::new());
    accumulator.add_gauge("g", 1.0);

    let mut sender = MockChunkSender::new();
    sender
        .expect_send_chunk()
        .times(1)
        .returning(|_, _| Err(SendError::UnsuccessfulStatus { status: 400 }));

    let dispatcher = Dispatcher::new(Arc::clone(&accumulator), Arc::new(sender), test_config());

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    dispatcher.run(shutdown).await;

    // The local reset already happened; the chunk is gone.
    assert!(accumulator.all_gauges().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_worker_retries_500_until_success() {
    let accumulator = Arc::new(MetricAccumulator::new());
    accumulator.add_gauge("g", 1.0);

    let attempts = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&attempts);

    let mut sender = MockChunkSender::new();
    sender.expect_send_chunk().times(3).returning(move |_, _| {
        let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
        if n < 3 {
            Err(SendError::UnsuccessfulStatus { status: 500 })
        } else {
            Ok(())
        }
    });

    let config = DispatcherConfig {
        max_request_retries: 3,
        ..test_config()
    };
    let dispatcher = Dispatcher::new(accumulator, Arc::new(sender), config);

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    dispatcher.run(shutdown).await;

    // Two 500s, then success: exactly three attempts.
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}
