//! Agent configuration.
//!
//! Three layers feed the final configuration: command-line flags are
//! parsed first, environment variables override them, and a JSON
//! config file fills whatever is still unset. Defaults apply last.
//! The server address must be a `host:port` pair with a numeric port.

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ADDRESS: &str = "localhost:8080";
const DEFAULT_POLL_SECS: u64 = 2;
const DEFAULT_REPORT_SECS: u64 = 10;
const DEFAULT_RATE_LIMIT: usize = 1;
const DEFAULT_CHUNK_SIZE: usize = 10;
const DEFAULT_MAX_REQUEST_RETRIES: u32 = 3;

// ============================================================================
// Command-line Flags
// ============================================================================

#[derive(Debug, Default, Parser)]
#[command(name = "agent", about = "Metrics agent for the metric-relay pipeline")]
struct AgentArgs {
    /// Server net address as host:port
    #[arg(short = 'a', long)]
    address: Option<String>,

    /// Metrics poll interval, seconds
    #[arg(short = 'p', long)]
    poll_interval: Option<u64>,

    /// Metrics report interval, seconds
    #[arg(short = 'r', long)]
    report_interval: Option<u64>,

    /// Shared key for request signing
    #[arg(short = 'k', long)]
    key: Option<String>,

    /// Number of simultaneous outgoing requests
    #[arg(short = 'l', long)]
    rate_limit: Option<usize>,

    /// gRPC server URL; when set, chunks go over gRPC instead of HTTP
    #[arg(long)]
    grpc: Option<String>,

    /// Path to the client private key (PEM)
    #[arg(long)]
    crypto_key: Option<PathBuf>,

    /// Path to the client certificate (PEM)
    #[arg(long)]
    client_cert: Option<PathBuf>,

    /// Path to the server certificate to trust (PEM)
    #[arg(long)]
    server_cert: Option<PathBuf>,

    /// Path to a JSON config file filling unset options
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

// ============================================================================
// Config File Shape
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    address: Option<String>,
    poll_interval: Option<u64>,
    report_interval: Option<u64>,
    key: Option<String>,
    rate_limit: Option<usize>,
    grpc: Option<String>,
    crypto_key: Option<PathBuf>,
    client_cert: Option<PathBuf>,
    server_cert: Option<PathBuf>,
}

// ============================================================================
// Resolved Configuration
// ============================================================================

/// Fully resolved agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Server address, `host:port`.
    pub address: String,

    /// Sampler tick period.
    pub poll_interval: Duration,

    /// Dispatcher wave period.
    pub report_interval: Duration,

    /// Shared HMAC key; `None` disables signing.
    pub signing_key: Option<String>,

    /// Worker-pool size / chunk-channel capacity.
    pub rate_limit: usize,

    /// gRPC target URL; `None` selects the HTTP sender.
    pub grpc_target: Option<String>,

    /// TLS client key path, handed to the HTTP client layer.
    pub crypto_key: Option<PathBuf>,

    /// TLS client certificate path.
    pub client_cert: Option<PathBuf>,

    /// Additional trusted server certificate path.
    pub server_cert: Option<PathBuf>,

    /// Metrics per chunk.
    pub chunk_size: usize,

    /// Per-chunk retry budget.
    pub max_request_retries: u32,
}

impl AgentConfig {
    /// Load configuration from flags, environment, and config file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(AgentArgs::parse(), &|name| std::env::var(name).ok())
    }

    fn resolve(
        args: AgentArgs,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let config_path = env("CONFIG").map(PathBuf::from).or(args.config);
        let file = match &config_path {
            Some(path) => read_config_file(path)?,
            None => FileConfig::default(),
        };

        let address = env("ADDRESS")
            .or(args.address)
            .or(file.address)
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        validate_address(&address)?;

        let poll_secs = env_parse::<u64>(env, "POLL_INTERVAL")?
            .or(args.poll_interval)
            .or(file.poll_interval)
            .unwrap_or(DEFAULT_POLL_SECS);
        let report_secs = env_parse::<u64>(env, "REPORT_INTERVAL")?
            .or(args.report_interval)
            .or(file.report_interval)
            .unwrap_or(DEFAULT_REPORT_SECS);
        let rate_limit = env_parse::<usize>(env, "RATE_LIMIT")?
            .or(args.rate_limit)
            .or(file.rate_limit)
            .unwrap_or(DEFAULT_RATE_LIMIT);

        Ok(Self {
            address,
            poll_interval: Duration::from_secs(poll_secs),
            report_interval: Duration::from_secs(report_secs),
            signing_key: env("KEY").or(args.key).or(file.key),
            rate_limit,
            grpc_target: env("GRPC_ADDRESS").or(args.grpc).or(file.grpc),
            crypto_key: env("CRYPTO_KEY").map(PathBuf::from).or(args.crypto_key).or(file.crypto_key),
            client_cert: args.client_cert.or(file.client_cert),
            server_cert: args.server_cert.or(file.server_cert),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_request_retries: DEFAULT_MAX_REQUEST_RETRIES,
        })
    }

    /// Base URL for the HTTP sender, scheme chosen by TLS material.
    pub fn http_base_url(&self) -> String {
        let scheme = if self.server_cert.is_some() {
            "https"
        } else {
            "http"
        };
        format!("{scheme}://{}", self.address)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::UnreadableFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::MalformedFile {
        path: path.to_path_buf(),
        source,
    })
}

fn env_parse<T: std::str::FromStr>(
    env: &dyn Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match env(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::BadEnvValue {
                name: name.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

pub(crate) fn validate_address(address: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = address.rsplit_once(':').ok_or_else(|| invalid("missing ':'"))?;
    if host.is_empty() {
        return Err(invalid("empty host"));
    }
    port.parse::<u16>()
        .map_err(|_| invalid("port is not numeric"))?;
    Ok(())
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("cannot read config file {path}: {source}")]
    UnreadableFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {source}")]
    MalformedFile {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("environment variable {name} holds unusable value '{value}'")]
    BadEnvValue { name: String, value: String },
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
