//! Tests for the gRPC service

use super::*;
use crate::storage::MemoryStorage;
use metric_relay_proto::Metric;

fn service_with_memory() -> (MetricsService, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let service = MetricsService::new(Arc::clone(&storage) as Arc<dyn MetricStorage>);
    (service, storage)
}

fn gauge(name: &str, value: f64) -> Metric {
    Metric {
        name: name.to_string(),
        r#type: "gauge".to_string(),
        value,
        delta: 0,
    }
}

fn counter(name: &str, delta: i64) -> Metric {
    Metric {
        name: name.to_string(),
        r#type: "counter".to_string(),
        value: 0.0,
        delta,
    }
}

#[tokio::test]
async fn test_batch_writes_both_kinds() {
    let (service, storage) = service_with_memory();

    let response = service
        .update_metrics(Request::new(UpdateMetricsRequest {
            metrics: vec![gauge("g1", 2.5), counter("c1", 5), counter("c1", 8)],
        }))
        .await
        .unwrap()
        .into_inner();

    assert!(response.error.is_empty());
    assert_eq!(storage.get_gauge("g1").await.unwrap(), Some(2.5));
    assert_eq!(storage.get_counter("c1").await.unwrap(), Some(13));
}

#[tokio::test]
async fn test_unknown_type_is_rejected_in_response_error() {
    let (service, storage) = service_with_memory();

    let response = service
        .update_metrics(Request::new(UpdateMetricsRequest {
            metrics: vec![Metric {
                name: "x".to_string(),
                r#type: "histogram".to_string(),
                value: 0.0,
                delta: 0,
            }],
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.error, "No such metric");
    assert!(storage.all_gauges().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_batch_is_a_successful_no_op() {
    let (service, _storage) = service_with_memory();

    let response = service
        .update_metrics(Request::new(UpdateMetricsRequest { metrics: vec![] }))
        .await
        .unwrap()
        .into_inner();

    assert!(response.error.is_empty());
}
