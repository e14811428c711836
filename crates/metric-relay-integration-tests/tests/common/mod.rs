//! Common test utilities for the pipeline integration tests.
//!
//! Spawns real listeners on ephemeral ports so the agent-side senders
//! exercise the same wire path they use in production.

use metric_relay_server::grpc::MetricsService;
use metric_relay_server::storage::{MemoryStorage, MetricStorage};
use metric_relay_server::{create_router, AppState};
use metric_relay_proto::MetricsServer;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

/// Start the HTTP server on an ephemeral port. Returns the base URL
/// and a handle on the backing storage for assertions.
#[allow(dead_code)]
pub async fn spawn_http_server(signing_key: Option<&str>) -> (String, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    spawn_http_server_with_storage(signing_key, Arc::clone(&storage)).await
}

/// Start the HTTP server over an existing storage instance.
#[allow(dead_code)]
pub async fn spawn_http_server_with_storage(
    signing_key: Option<&str>,
    storage: Arc<MemoryStorage>,
) -> (String, Arc<MemoryStorage>) {
    let state = AppState {
        storage: Arc::clone(&storage) as Arc<dyn MetricStorage>,
        signing_key: signing_key.map(String::from),
        database_dsn: None,
        trusted_subnet: None,
    };
    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral port available");
    let addr = listener.local_addr().expect("listener has an address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server runs");
    });

    (format!("http://{addr}"), storage)
}

/// Start the gRPC server on an ephemeral port. Returns the endpoint
/// URL and a handle on the backing storage.
#[allow(dead_code)]
pub async fn spawn_grpc_server() -> (String, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let service = MetricsService::new(Arc::clone(&storage) as Arc<dyn MetricStorage>);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral port available");
    let addr = listener.local_addr().expect("listener has an address");

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(MetricsServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("test gRPC server runs");
    });

    (format!("http://{addr}"), storage)
}
