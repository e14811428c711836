//! gRPC ingestion surface.
//!
//! The `Metrics` service applies the same writes as the HTTP batch
//! endpoint against the same shared storage. Unknown metric types are
//! rejected in the response's `error` field (terminal for the agent);
//! storage failures become `internal` statuses (retriable).

use crate::storage::MetricStorage;
use metric_relay_proto::{Metrics, UpdateMetricsRequest, UpdateMetricsResponse};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{info, instrument};

/// Tonic service over the shared metric storage.
pub struct MetricsService {
    storage: Arc<dyn MetricStorage>,
}

impl MetricsService {
    pub fn new(storage: Arc<dyn MetricStorage>) -> Self {
        Self { storage }
    }
}

#[tonic::async_trait]
impl Metrics for MetricsService {
    #[instrument(skip(self, request))]
    async fn update_metrics(
        &self,
        request: Request<UpdateMetricsRequest>,
    ) -> Result<Response<UpdateMetricsResponse>, Status> {
        let metrics = request.into_inner().metrics;
        info!(metrics = metrics.len(), "received gRPC metrics batch");

        for metric in metrics {
            match metric.r#type.as_str() {
                "gauge" => {
                    self.storage
                        .add_gauge(&metric.name, metric.value)
                        .await
                        .map_err(|err| Status::internal(err.to_string()))?;
                }
                "counter" => {
                    self.storage
                        .add_counter(&metric.name, metric.delta)
                        .await
                        .map_err(|err| Status::internal(err.to_string()))?;
                }
                _ => {
                    return Ok(Response::new(UpdateMetricsResponse {
                        error: "No such metric".to_string(),
                    }));
                }
            }
        }

        Ok(Response::new(UpdateMetricsResponse {
            error: String::new(),
        }))
    }
}

#[cfg(test)]
#[path = "grpc_tests.rs"]
mod tests;
