//! # Metric-Relay Agent
//!
//! Samples runtime and host metrics and pushes them to the relay
//! server in periodic waves.
//!
//! Components:
//! - [`accumulator`]: shared gauge/counter container written by samplers
//! - [`sampler`]: periodic runtime and system sampling loops
//! - [`dispatcher`]: wave collection, chunking, and worker fan-out
//! - [`sender`]: HTTP and gRPC chunk delivery
//! - [`config`]: flags / environment / config-file layering

pub mod accumulator;
pub mod config;
pub mod dispatcher;
pub mod sampler;
pub mod sender;

use crate::accumulator::MetricAccumulator;
use crate::config::AgentConfig;
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::sampler::{spawn_runtime_sampler, spawn_system_sampler};
use crate::sender::{ChunkSender, GrpcSender, HttpSender};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Agent startup failures.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("cannot read TLS material {path}: {source}")]
    TlsMaterial {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Wire up and run the agent until a shutdown signal arrives.
///
/// The dispatcher owns the shutdown sequence: on cancellation it
/// drains one final wave and joins its workers before this function
/// joins the sampler loops and returns.
pub async fn run_agent(config: AgentConfig) -> Result<(), AgentError> {
    let accumulator = Arc::new(MetricAccumulator::new());
    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let samplers = [
        spawn_runtime_sampler(
            Arc::clone(&accumulator),
            config.poll_interval,
            shutdown.clone(),
        ),
        spawn_system_sampler(
            Arc::clone(&accumulator),
            config.poll_interval,
            shutdown.clone(),
        ),
    ];

    let sender: Arc<dyn ChunkSender> = match &config.grpc_target {
        Some(target) => {
            info!(target, "delivering chunks over gRPC");
            Arc::new(GrpcSender::new(target.clone()))
        }
        None => {
            let client = build_http_client(&config)?;
            Arc::new(HttpSender::new(
                client,
                &config.http_base_url(),
                config.signing_key.clone(),
            ))
        }
    };

    let dispatcher = Dispatcher::new(
        accumulator,
        sender,
        DispatcherConfig {
            report_interval: config.report_interval,
            chunk_size: config.chunk_size,
            rate_limit: config.rate_limit,
            max_request_retries: config.max_request_retries,
        },
    );

    info!(
        address = %config.address,
        poll_secs = config.poll_interval.as_secs(),
        report_secs = config.report_interval.as_secs(),
        rate_limit = config.rate_limit,
        "agent started"
    );

    dispatcher.run(shutdown).await;

    for sampler in samplers {
        let _ = sampler.await;
    }
    info!("agent stopped");
    Ok(())
}

fn build_http_client(config: &AgentConfig) -> Result<reqwest::Client, AgentError> {
    let read = |path: &PathBuf| {
        std::fs::read(path).map_err(|source| AgentError::TlsMaterial {
            path: path.clone(),
            source,
        })
    };

    let mut builder = reqwest::Client::builder();

    if let Some(path) = &config.server_cert {
        let certificate = reqwest::Certificate::from_pem(&read(path)?)?;
        builder = builder.add_root_certificate(certificate);
    }

    if let (Some(cert_path), Some(key_path)) = (&config.client_cert, &config.crypto_key) {
        // rustls wants certificate and key concatenated in one PEM bundle.
        let mut bundle = read(cert_path)?;
        bundle.extend_from_slice(&read(key_path)?);
        builder = builder.identity(reqwest::Identity::from_pem(&bundle)?);
    }

    Ok(builder.build()?)
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
