//! # Metric-Relay Server
//!
//! HTTP and gRPC ingestion for pushed metrics, with query endpoints
//! and durable retention.
//!
//! The server terminates both listeners on one shared [`storage`]
//! backend. Writes follow a strict contract: validate, verify the
//! batch signature when a key is configured, store, then re-read to
//! confirm visibility. Shutdown drains in-flight requests on both
//! listeners before finalizing storage.

pub mod config;
pub mod grpc;
pub mod middleware;
pub mod report;
pub mod storage;

use crate::config::ServerConfig;
use crate::grpc::MetricsService;
use crate::report::render_report;
use crate::storage::{MemoryStorage, MetricStorage, PostgresStorage, StorageError};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware as axum_middleware;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use metric_relay_core::{
    verify_signature, MetricKind, MetricPayload, ValidationError, SIGNATURE_HEADER,
};
use metric_relay_proto::MetricsServer;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::{error, info, instrument};

// ============================================================================
// Application State
// ============================================================================

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Storage backend selected at startup.
    pub storage: Arc<dyn MetricStorage>,

    /// Shared HMAC key for batch signature checks.
    pub signing_key: Option<String>,

    /// DSN used by the `/ping` reachability probe.
    pub database_dsn: Option<String>,

    /// CIDR for the trusted-subnet middleware.
    pub trusted_subnet: Option<String>,
}

// ============================================================================
// Wire Types
// ============================================================================

/// Incoming metric as parsed from request JSON. The kind stays a raw
/// string here so an unknown type can be answered with the contract's
/// `No such metric` body instead of a serde error.
#[derive(Debug, Deserialize)]
pub struct MetricRequest {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub delta: Option<i64>,

    #[serde(default)]
    pub value: Option<f64>,
}

// ============================================================================
// Router
// ============================================================================

/// Build the HTTP router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    // JSON and report endpoints get content-type restriction and
    // request decompression; the path-form endpoints take raw URLs.
    let json_routes = Router::new()
        .route("/", get(get_all_metrics))
        .route("/update/", post(update_metric_json))
        .route("/value/", post(read_metric_json))
        .route("/updates/", post(update_metrics_batch))
        .route("/ping", get(ping))
        .route_layer(axum_middleware::from_fn(middleware::decompress_request));

    let path_routes = Router::new()
        .route(
            "/update/:metric_type/:metric_name/:metric_value",
            post(create_metric),
        )
        .route("/value/:metric_type/:metric_name", get(get_metric_by_value));

    Router::new()
        .merge(json_routes)
        .merge(path_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(axum_middleware::from_fn(middleware::request_logging))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::trusted_subnet,
                ))
                .into_inner(),
        )
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Path-form write: `POST /update/{type}/{name}/{value}`.
#[instrument(skip(state))]
async fn create_metric(
    State(state): State<AppState>,
    Path((metric_type, metric_name, metric_value)): Path<(String, String, String)>,
) -> Result<&'static str, ApiError> {
    let kind = MetricKind::parse(&metric_type).map_err(ApiError::Validation)?;

    match kind {
        MetricKind::Gauge => {
            let value: f64 = metric_value
                .parse()
                .map_err(|_| bad_literal(kind, &metric_value))?;
            state.storage.add_gauge(&metric_name, value).await?;
        }
        MetricKind::Counter => {
            let delta: i64 = metric_value
                .parse()
                .map_err(|_| bad_literal(kind, &metric_value))?;
            state.storage.add_counter(&metric_name, delta).await?;
        }
    }

    Ok("Created")
}

/// Path-form read: `GET /value/{type}/{name}`, plain-text number.
#[instrument(skip(state))]
async fn get_metric_by_value(
    State(state): State<AppState>,
    Path((metric_type, metric_name)): Path<(String, String)>,
) -> Result<String, ApiError> {
    match metric_type.as_str() {
        "counter" => {
            let delta = state
                .storage
                .get_counter(&metric_name)
                .await?
                .ok_or(ApiError::NotFound)?;
            Ok(delta.to_string())
        }
        "gauge" => {
            let value = state
                .storage
                .get_gauge(&metric_name)
                .await?
                .ok_or(ApiError::NotFound)?;
            Ok(value.to_string())
        }
        _ => Err(ApiError::UnknownKindOnRead),
    }
}

/// Summary report: `GET /`.
async fn get_all_metrics(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let gauges = state.storage.all_gauges().await?;
    let counters = state.storage.all_counters().await?;
    Ok(Html(render_report(&gauges, &counters)))
}

/// Single JSON write: `POST /update/`, echoes the stored metric.
#[instrument(skip(state, body))]
async fn update_metric_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricPayload>, ApiError> {
    let metric = parse_metric_request(&body)?;
    let stored = store_metric(state.storage.as_ref(), &metric).await?;
    Ok(Json(stored))
}

/// Single JSON read: `POST /value/`, fills the carrier.
#[instrument(skip(state, body))]
async fn read_metric_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricPayload>, ApiError> {
    let request = parse_metric_request(&body)?;
    let kind = MetricKind::parse(&request.kind).map_err(ApiError::Validation)?;

    match kind {
        MetricKind::Gauge => {
            let value = state
                .storage
                .get_gauge(&request.id)
                .await?
                .ok_or(ApiError::NotFound)?;
            Ok(Json(MetricPayload::gauge(request.id, value)))
        }
        MetricKind::Counter => {
            let delta = state
                .storage
                .get_counter(&request.id)
                .await?
                .ok_or(ApiError::NotFound)?;
            Ok(Json(MetricPayload::counter(request.id, delta)))
        }
    }
}

/// Batch write: `POST /updates/` with signature verification.
#[instrument(skip(state, headers, body))]
async fn update_metrics_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(key) = &state.signing_key {
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(&body, key, provided) {
            return Err(ApiError::Validation(ValidationError::BadSignature));
        }
    }

    let metrics: Vec<MetricRequest> = serde_json::from_slice(&body)
        .map_err(|err| ApiError::Validation(malformed(err)))?;
    info!(metrics = metrics.len(), "received metrics batch");

    for metric in &metrics {
        store_metric(state.storage.as_ref(), metric).await?;
    }

    Ok(Json(serde_json::json!({"result": "ok"})))
}

/// Database reachability probe: `GET /ping`.
#[instrument(skip(state))]
async fn ping(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let Some(dsn) = &state.database_dsn else {
        return Err(ApiError::DatabaseUnavailable);
    };
    PostgresStorage::ping(dsn).await?;
    Ok(StatusCode::OK)
}

// ============================================================================
// Write Helpers
// ============================================================================

/// Apply one metric write and re-read it to confirm visibility,
/// returning the canonical stored form (counters report the
/// accumulated sum).
async fn store_metric(
    storage: &dyn MetricStorage,
    metric: &MetricRequest,
) -> Result<MetricPayload, ApiError> {
    let kind = MetricKind::parse(&metric.kind).map_err(ApiError::Validation)?;

    match kind {
        MetricKind::Gauge => {
            let value = metric.value.ok_or_else(|| missing_carrier(kind, "value"))?;
            storage.add_gauge(&metric.id, value).await?;
            let stored = storage
                .get_gauge(&metric.id)
                .await?
                .ok_or(ApiError::NotFound)?;
            Ok(MetricPayload::gauge(metric.id.clone(), stored))
        }
        MetricKind::Counter => {
            let delta = metric.delta.ok_or_else(|| missing_carrier(kind, "delta"))?;
            storage.add_counter(&metric.id, delta).await?;
            let stored = storage
                .get_counter(&metric.id)
                .await?
                .ok_or(ApiError::NotFound)?;
            Ok(MetricPayload::counter(metric.id.clone(), stored))
        }
    }
}

fn parse_metric_request(body: &[u8]) -> Result<MetricRequest, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::Validation(malformed(err)))
}

fn malformed(err: serde_json::Error) -> ValidationError {
    ValidationError::MalformedJson {
        message: err.to_string(),
    }
}

fn bad_literal(kind: MetricKind, literal: &str) -> ApiError {
    ApiError::Validation(ValidationError::BadLiteral {
        kind,
        literal: literal.to_string(),
    })
}

fn missing_carrier(kind: MetricKind, carrier: &'static str) -> ApiError {
    ApiError::Validation(ValidationError::MissingCarrier { kind, carrier })
}

// ============================================================================
// Handler Errors
// ============================================================================

/// Handler-level error, translated to the protocol's status codes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ValidationError),

    #[error("No such metric type")]
    UnknownKindOnRead,

    #[error("metric not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("database is not configured or unreachable")]
    DatabaseUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::UnknownKindOnRead => (StatusCode::NOT_FOUND, self.to_string()),
            Self::NotFound => (StatusCode::NOT_FOUND, String::new()),
            Self::Storage(err) => {
                error!(error = %err, "storage failure while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, String::new())
            }
            Self::DatabaseUnavailable => (StatusCode::INTERNAL_SERVER_ERROR, String::new()),
        };
        (status, body).into_response()
    }
}

// ============================================================================
// Ingestion Lifecycle
// ============================================================================

/// Service-level startup and shutdown failures.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("HTTP server failed: {message}")]
    ServerFailed { message: String },

    #[error("gRPC server failed: {message}")]
    GrpcFailed { message: String },

    #[error("invalid gRPC listen address '{address}'")]
    InvalidGrpcAddress { address: String },

    #[error("storage initialization failed: {0}")]
    StorageInit(#[from] StorageError),

    #[error("snapshot restore failed: {source}")]
    RestoreFailed {
        #[source]
        source: StorageError,
    },
}

/// Construct storage, start both listeners, and serve until a shutdown
/// signal arrives; then drain, stop the save loop, and finalize
/// storage.
pub async fn run_server(config: ServerConfig) -> Result<(), ServiceError> {
    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let (storage, save_loop) = build_storage(&config, &shutdown).await?;

    let state = AppState {
        storage: Arc::clone(&storage),
        signing_key: config.signing_key.clone(),
        database_dsn: config.database_dsn.clone(),
        trusted_subnet: config.trusted_subnet.clone(),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.address.as_str())
        .await
        .map_err(|err| ServiceError::BindFailed {
            address: config.address.clone(),
            message: err.to_string(),
        })?;
    info!(address = %config.address, "HTTP listener bound");

    let grpc_address = format!("0.0.0.0:{}", config.grpc_port);
    let grpc_addr: SocketAddr =
        grpc_address
            .parse()
            .map_err(|_| ServiceError::InvalidGrpcAddress {
                address: grpc_address.clone(),
            })?;
    info!(address = %grpc_address, "gRPC listener starting");

    // Each server cancels the shared token when it exits, so a crash
    // in one drains the other instead of leaving it orphaned.
    let http_shutdown = shutdown.clone();
    let http_done = shutdown.clone();
    let http = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await;
        http_done.cancel();
        result
    });

    let grpc_service = MetricsService::new(Arc::clone(&storage));
    let grpc_shutdown = shutdown.clone();
    let grpc_done = shutdown.clone();
    let grpc = tokio::spawn(async move {
        let result = tonic::transport::Server::builder()
            .add_service(MetricsServer::new(grpc_service))
            .serve_with_shutdown(grpc_addr, async move { grpc_shutdown.cancelled().await })
            .await;
        grpc_done.cancel();
        result
    });

    let http_result = http.await;
    let grpc_result = grpc.await;
    if let Some(handle) = save_loop {
        let _ = handle.await;
    }

    // In-flight writes have drained; persist the final state. A
    // finalize failure is logged and the process still exits cleanly.
    match storage.finalize().await {
        Ok(()) => info!("storage finalized"),
        Err(err) => error!(error = %err, "storage finalization failed"),
    }

    match http_result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            return Err(ServiceError::ServerFailed {
                message: err.to_string(),
            })
        }
        Err(err) => {
            return Err(ServiceError::ServerFailed {
                message: err.to_string(),
            })
        }
    }
    match grpc_result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            return Err(ServiceError::GrpcFailed {
                message: err.to_string(),
            })
        }
        Err(err) => {
            return Err(ServiceError::GrpcFailed {
                message: err.to_string(),
            })
        }
    }

    info!("server stopped");
    Ok(())
}

async fn build_storage(
    config: &ServerConfig,
    shutdown: &CancellationToken,
) -> Result<(Arc<dyn MetricStorage>, Option<JoinHandle<()>>), ServiceError> {
    if let Some(dsn) = &config.database_dsn {
        let storage = PostgresStorage::connect(dsn).await?;
        storage.run_migrations().await?;
        let storage: Arc<dyn MetricStorage> = Arc::new(storage);
        return Ok((storage, None));
    }

    if !config.snapshots_enabled() {
        info!("snapshots disabled, state is volatile");
        let storage: Arc<dyn MetricStorage> = Arc::new(MemoryStorage::new());
        return Ok((storage, None));
    }

    let storage = Arc::new(MemoryStorage::with_snapshot(
        &config.snapshot_path,
        config.sync_writes(),
    ));
    if config.restore {
        storage
            .load_snapshot()
            .await
            .map_err(|source| ServiceError::RestoreFailed { source })?;
    }

    let save_loop = if config.sync_writes() {
        info!(path = %config.snapshot_path, "sync-write snapshot mode");
        None
    } else {
        info!(
            path = %config.snapshot_path,
            interval_secs = config.store_interval.as_secs(),
            "interval snapshot mode"
        );
        Some(storage.spawn_save_loop(config.store_interval, shutdown.clone()))
    };

    Ok((storage as Arc<dyn MetricStorage>, save_loop))
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut quit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
