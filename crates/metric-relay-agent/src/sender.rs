//! Chunk delivery to the server.
//!
//! [`ChunkSender`] is the seam between the dispatcher's worker pool and
//! the transport. Two implementations exist: JSON-over-HTTP with
//! optional signing and gzip, and protobuf-over-gRPC with a per-RPC
//! deadline. Workers classify errors through [`SendError::is_retriable`]
//! to decide whether a chunk is worth another attempt.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use metric_relay_core::{compute_signature, MetricPayload, REAL_IP_HEADER, SIGNATURE_HEADER};
use metric_relay_proto::{Metric as ProtoMetric, MetricsClient, UpdateMetricsRequest};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::io::Write;
use std::time::Duration;
use tonic::Code;
use tracing::debug;

/// Deadline for one gRPC update call.
const RPC_DEADLINE: Duration = Duration::from_secs(1);

// ============================================================================
// Sender Contract
// ============================================================================

/// Transport-agnostic chunk delivery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChunkSender: Send + Sync {
    /// Deliver one chunk of metrics. `worker_id` identifies the calling
    /// worker for log attribution only.
    async fn send_chunk(&self, worker_id: usize, chunk: &[MetricPayload])
        -> Result<(), SendError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Delivery failures, split so the retry classifier can tell transient
/// transport trouble from terminal rejections.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response is not OK, status: {status}")]
    UnsuccessfulStatus { status: u16 },

    #[error("failed to serialize chunk: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to compress chunk: {0}")]
    Compress(#[source] std::io::Error),

    #[error("gRPC connect failed: {0}")]
    GrpcConnect(#[from] tonic::transport::Error),

    #[error("gRPC call failed: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("gRPC call exceeded the {}s deadline", RPC_DEADLINE.as_secs())]
    Deadline,

    #[error("server rejected metrics: {reason}")]
    Rejected { reason: String },
}

impl SendError {
    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Network-level failures and HTTP 500 are retriable; every other
    /// status, serialization trouble, and explicit server rejections
    /// are terminal.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::GrpcConnect(_) | Self::Deadline => true,
            Self::UnsuccessfulStatus { status } => *status == 500,
            Self::Grpc(status) => matches!(
                status.code(),
                Code::Unavailable | Code::DeadlineExceeded | Code::Internal | Code::Aborted
            ),
            Self::Serialize(_) | Self::Compress(_) | Self::Rejected { .. } => false,
        }
    }
}

// ============================================================================
// HTTP Sender
// ============================================================================

/// Delivers chunks as a JSON array to `POST {base}/updates/`.
///
/// When a signing key is configured the uncompressed JSON bytes are
/// signed and the hex digest travels in the `HashSHA256` header; the
/// server verifies the same bytes after decompressing. The body itself
/// is gzip-compressed unless compression is disabled.
pub struct HttpSender {
    client: reqwest::Client,
    endpoint: String,
    signing_key: Option<String>,
    ip_hint: String,
    compress: bool,
}

impl HttpSender {
    /// `base_url` carries the scheme, e.g. `http://localhost:8080`.
    pub fn new(client: reqwest::Client, base_url: &str, signing_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}/updates/", base_url.trim_end_matches('/')),
            signing_key,
            ip_hint: "127.0.0.1".to_string(),
            compress: true,
        }
    }

    /// Disable request-body gzip compression.
    pub fn without_compression(mut self) -> Self {
        self.compress = false;
        self
    }

    /// Override the `X-Real-IP` hint sent with every request.
    pub fn with_ip_hint(mut self, ip_hint: impl Into<String>) -> Self {
        self.ip_hint = ip_hint.into();
        self
    }
}

#[async_trait]
impl ChunkSender for HttpSender {
    async fn send_chunk(
        &self,
        worker_id: usize,
        chunk: &[MetricPayload],
    ) -> Result<(), SendError> {
        let body = serde_json::to_vec(chunk)?;
        debug!(worker_id, metrics = chunk.len(), "sending chunk over HTTP");

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(REAL_IP_HEADER, &self.ip_hint);

        // The signature covers the uncompressed payload.
        if let Some(key) = &self.signing_key {
            request = request.header(SIGNATURE_HEADER, compute_signature(&body, key));
        }

        let request = if self.compress {
            request
                .header(CONTENT_ENCODING, "gzip")
                .body(gzip_encode(&body)?)
        } else {
            request.body(body)
        };

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(SendError::UnsuccessfulStatus {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

fn gzip_encode(data: &[u8]) -> Result<Vec<u8>, SendError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(SendError::Compress)?;
    encoder.finish().map_err(SendError::Compress)
}

// ============================================================================
// gRPC Sender
// ============================================================================

/// Delivers chunks as one `UpdateMetricsRequest` per chunk.
///
/// A fresh connection is made per chunk; the whole call is bounded by
/// [`RPC_DEADLINE`]. A non-empty `error` field in the response is a
/// terminal rejection.
pub struct GrpcSender {
    endpoint: String,
}

impl GrpcSender {
    /// Accepts `host:port` or a full URL; a bare address gets the
    /// plain-HTTP scheme tonic expects.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let endpoint = if endpoint.contains("://") {
            endpoint
        } else {
            format!("http://{endpoint}")
        };
        Self { endpoint }
    }
}

#[async_trait]
impl ChunkSender for GrpcSender {
    async fn send_chunk(
        &self,
        worker_id: usize,
        chunk: &[MetricPayload],
    ) -> Result<(), SendError> {
        debug!(worker_id, metrics = chunk.len(), "sending chunk over gRPC");

        let mut client = MetricsClient::connect(self.endpoint.clone()).await?;
        let request = UpdateMetricsRequest {
            metrics: chunk.iter().map(to_proto).collect(),
        };

        let response = tokio::time::timeout(RPC_DEADLINE, client.update_metrics(request))
            .await
            .map_err(|_| SendError::Deadline)?
            .map_err(SendError::Grpc)?
            .into_inner();

        if !response.error.is_empty() {
            return Err(SendError::Rejected {
                reason: response.error,
            });
        }
        Ok(())
    }
}

fn to_proto(metric: &MetricPayload) -> ProtoMetric {
    ProtoMetric {
        name: metric.id.clone(),
        r#type: metric.kind.as_str().to_string(),
        value: metric.value.unwrap_or_default(),
        delta: metric.delta.unwrap_or_default(),
    }
}

#[cfg(test)]
#[path = "sender_tests.rs"]
mod tests;
