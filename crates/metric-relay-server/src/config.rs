//! Server configuration.
//!
//! Same layering as the agent: flags first, environment variables
//! override them, a JSON config file fills the rest, defaults last.
//! Backend selection falls out of the result: a database DSN selects
//! PostgreSQL, otherwise the in-memory store is used with the snapshot
//! settings below.

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ADDRESS: &str = "localhost:8080";
pub const DEFAULT_SNAPSHOT_PATH: &str = "/tmp/metrics-db.json";
const DEFAULT_STORE_SECS: u64 = 300;
const DEFAULT_GRPC_PORT: u16 = 3200;

// ============================================================================
// Command-line Flags
// ============================================================================

#[derive(Debug, Default, Parser)]
#[command(name = "server", about = "Metrics server for the metric-relay pipeline")]
struct ServerArgs {
    /// Net address to listen on as host:port
    #[arg(short = 'a', long)]
    address: Option<String>,

    /// Snapshot interval in seconds; 0 selects sync-write mode
    #[arg(short = 'i', long)]
    store_interval: Option<u64>,

    /// Snapshot file path; empty disables snapshots
    #[arg(short = 'f', long)]
    file_storage_path: Option<String>,

    /// Restore state from the snapshot file at startup
    #[arg(short = 'r', long)]
    restore: Option<bool>,

    /// PostgreSQL DSN; when set, storage moves to the database
    #[arg(short = 'd', long)]
    database_dsn: Option<String>,

    /// Shared key for batch signature verification
    #[arg(short = 'k', long)]
    key: Option<String>,

    /// Trusted subnet in CIDR form for X-Real-IP filtering
    #[arg(short = 't', long)]
    trusted_subnet: Option<String>,

    /// Port for the gRPC listener
    #[arg(long)]
    grpc_port: Option<u16>,

    /// Path to the TLS private key (PEM)
    #[arg(long)]
    crypto_key: Option<PathBuf>,

    /// Path to the TLS certificate (PEM)
    #[arg(long)]
    cert: Option<PathBuf>,

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
    store_interval: Option<u64>,
    file_storage_path: Option<String>,
    restore: Option<bool>,
    database_dsn: Option<String>,
    key: Option<String>,
    trusted_subnet: Option<String>,
    grpc_port: Option<u16>,
    crypto_key: Option<PathBuf>,
    cert: Option<PathBuf>,
}

// ============================================================================
// Resolved Configuration
// ============================================================================

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen address, `host:port`.
    pub address: String,

    /// Snapshot period; zero means sync-write mode.
    pub store_interval: Duration,

    /// Snapshot file path; empty disables snapshots entirely.
    pub snapshot_path: String,

    /// Whether to load the snapshot at startup.
    pub restore: bool,

    /// PostgreSQL DSN; `None` selects the in-memory store.
    pub database_dsn: Option<String>,

    /// Shared HMAC key; `None` disables batch signature checks.
    pub signing_key: Option<String>,

    /// Trusted subnet CIDR; `None` disables X-Real-IP filtering.
    pub trusted_subnet: Option<String>,

    /// gRPC listen port.
    pub grpc_port: u16,

    /// TLS private key path, validated at startup when set.
    pub crypto_key: Option<PathBuf>,

    /// TLS certificate path, validated at startup when set.
    pub cert: Option<PathBuf>,
}

impl ServerConfig {
    /// Load configuration from flags, environment, and config file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(ServerArgs::parse(), &|name| std::env::var(name).ok())
    }

    fn resolve(
        args: ServerArgs,
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

        let store_secs = env_parse::<u64>(env, "STORE_INTERVAL")?
            .or(args.store_interval)
            .or(file.store_interval)
            .unwrap_or(DEFAULT_STORE_SECS);
        let restore = env_parse::<bool>(env, "RESTORE")?
            .or(args.restore)
            .or(file.restore)
            .unwrap_or(true);
        let grpc_port = env_parse::<u16>(env, "GRPC_PORT")?
            .or(args.grpc_port)
            .or(file.grpc_port)
            .unwrap_or(DEFAULT_GRPC_PORT);

        let config = Self {
            address,
            store_interval: Duration::from_secs(store_secs),
            snapshot_path: env("FILE_STORAGE_PATH")
                .or(args.file_storage_path)
                .or(file.file_storage_path)
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string()),
            restore,
            database_dsn: env("DATABASE_DSN").or(args.database_dsn).or(file.database_dsn),
            signing_key: env("KEY").or(args.key).or(file.key),
            trusted_subnet: env("TRUSTED_SUBNET")
                .or(args.trusted_subnet)
                .or(file.trusted_subnet),
            grpc_port,
            crypto_key: env("CRYPTO_KEY")
                .map(PathBuf::from)
                .or(args.crypto_key)
                .or(file.crypto_key),
            cert: args.cert.or(file.cert),
        };
        config.validate_tls_material()?;
        Ok(config)
    }

    /// Snapshots are active only on the in-memory backend with a
    /// non-empty path.
    pub fn snapshots_enabled(&self) -> bool {
        self.database_dsn.is_none() && !self.snapshot_path.is_empty()
    }

    /// Sync-write mode: persist on every mutation instead of on a
    /// timer.
    pub fn sync_writes(&self) -> bool {
        self.store_interval.is_zero()
    }

    fn validate_tls_material(&self) -> Result<(), ConfigError> {
        for path in [&self.cert, &self.crypto_key].into_iter().flatten() {
            if !path.exists() {
                return Err(ConfigError::MissingTlsMaterial { path: path.clone() });
            }
        }
        Ok(())
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

    #[error("TLS material not found at {path}")]
    MissingTlsMaterial { path: PathBuf },
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
