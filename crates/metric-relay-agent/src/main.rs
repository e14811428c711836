//! Binary entry point for the metric-relay agent.
//!
//! Loads the layered configuration, initializes tracing, and runs the
//! sampling/dispatch loops until a shutdown signal arrives.

use metric_relay_agent::config::AgentConfig;
use metric_relay_agent::{run_agent, AgentError};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metric_relay_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AgentConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_agent(config).await {
        error!("agent failed: {}", e);

        let exit_code = match e {
            AgentError::Configuration(_) => 1,
            AgentError::TlsMaterial { .. } => 2,
            AgentError::HttpClient(_) => 3,
        };
        std::process::exit(exit_code);
    }
}
