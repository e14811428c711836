//! Binary entry point for the metric-relay server.
//!
//! Loads the layered configuration, initializes tracing, and serves
//! HTTP and gRPC until a shutdown signal arrives; the exit code
//! distinguishes the fatal-init failure classes.

use metric_relay_server::config::ServerConfig;
use metric_relay_server::{run_server, ServiceError};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metric_relay_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_server(config).await {
        error!("server failed: {}", e);

        let exit_code = match e {
            ServiceError::Configuration(_) => 1,
            ServiceError::BindFailed { .. } | ServiceError::InvalidGrpcAddress { .. } => 2,
            ServiceError::ServerFailed { .. } | ServiceError::GrpcFailed { .. } => 3,
            ServiceError::StorageInit(_) => 4,
            ServiceError::RestoreFailed { .. } => 5,
        };
        std::process::exit(exit_code);
    }
}
