//! # Metric-Relay Proto
//!
//! Generated protobuf types and service stubs for the gRPC delivery
//! path. The `.proto` contract lives in `proto/metrics.proto`; both
//! the agent's client and the server's service are generated from it.

/// Generated types for the `metrics` package.
pub mod pb {
    tonic::include_proto!("metrics");
}

pub use pb::metrics_client::MetricsClient;
pub use pb::metrics_server::{Metrics, MetricsServer};
pub use pb::{Metric, UpdateMetricsRequest, UpdateMetricsResponse};
