//! Agent-to-server delivery over gRPC.

mod common;

use common::spawn_grpc_server;
use metric_relay_agent::accumulator::MetricAccumulator;
use metric_relay_agent::dispatcher::{Dispatcher, DispatcherConfig};
use metric_relay_agent::sender::{ChunkSender, GrpcSender, SendError};
use metric_relay_core::MetricPayload;
use metric_relay_proto::{Metric, MetricsClient, UpdateMetricsRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_grpc_wave_reaches_storage() {
    let (endpoint, storage) = spawn_grpc_server().await;

    let accumulator = Arc::new(MetricAccumulator::new());
    accumulator.add_gauge("FreeMemory", 4096.0);
    accumulator.add_counter("PollCount", 11);

    let dispatcher = Dispatcher::new(
        Arc::clone(&accumulator),
        Arc::new(GrpcSender::new(endpoint)),
        DispatcherConfig {
            report_interval: Duration::from_secs(3600),
            chunk_size: 10,
            rate_limit: 1,
            max_request_retries: 0,
        },
    );

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    dispatcher.run(shutdown).await;

    assert_eq!(storage.get_gauge("FreeMemory").await.unwrap(), Some(4096.0));
    assert_eq!(storage.get_counter("PollCount").await.unwrap(), Some(11));
}

#[tokio::test]
async fn test_grpc_sender_delivers_mixed_chunk() {
    let (endpoint, storage) = spawn_grpc_server().await;
    let sender = GrpcSender::new(endpoint);

    let chunk = vec![
        MetricPayload::gauge("TotalMemory", 8192.0),
        MetricPayload::counter("PollCount", 3),
        MetricPayload::counter("PollCount", 2),
    ];
    sender.send_chunk(0, &chunk).await.unwrap();

    assert_eq!(storage.get_gauge("TotalMemory").await.unwrap(), Some(8192.0));
    assert_eq!(storage.get_counter("PollCount").await.unwrap(), Some(5));
}

#[tokio::test]
async fn test_unknown_kind_is_rejected_by_the_server() {
    let (endpoint, storage) = spawn_grpc_server().await;

    // Drive the raw client: the sender itself only produces known
    // kinds, so a rejection has to come from a hand-built request.
    let mut client = MetricsClient::connect(endpoint).await.unwrap();
    let response = client
        .update_metrics(UpdateMetricsRequest {
            metrics: vec![Metric {
                name: "x".to_string(),
                r#type: "histogram".to_string(),
                value: 0.0,
                delta: 0,
            }],
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.error, "No such metric");
    assert!(storage.all_gauges().await.unwrap().is_empty());

    // This is exactly what the sender classifies as terminal.
    let err = SendError::Rejected {
        reason: response.error,
    };
    assert!(!err.is_retriable());
}

#[tokio::test]
async fn test_grpc_connect_failure_is_retriable() {
    let sender = GrpcSender::new("127.0.0.1:1");

    let err = sender
        .send_chunk(0, &[MetricPayload::counter("c", 1)])
        .await
        .unwrap_err();

    assert!(err.is_retriable());
}
