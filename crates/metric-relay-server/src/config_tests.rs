//! Tests for server configuration layering

use super::*;
use std::io::Write;

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn test_defaults() {
    let config = ServerConfig::resolve(ServerArgs::default(), &no_env).unwrap();

    assert_eq!(config.address, "localhost:8080");
    assert_eq!(config.store_interval, Duration::from_secs(300));
    assert_eq!(config.snapshot_path, "/tmp/metrics-db.json");
    assert!(config.restore);
    assert_eq!(config.grpc_port, 3200);
    assert!(config.database_dsn.is_none());
    assert!(config.signing_key.is_none());
    assert!(config.trusted_subnet.is_none());
}

#[test]
fn test_environment_overrides_flags() {
    let args = ServerArgs {
        store_interval: Some(60),
        restore: Some(true),
        ..ServerArgs::default()
    };
    let env = |name: &str| match name {
        "STORE_INTERVAL" => Some("0".to_string()),
        "RESTORE" => Some("false".to_string()),
        _ => None,
    };

    let config = ServerConfig::resolve(args, &env).unwrap();

    assert!(config.sync_writes());
    assert!(!config.restore);
}

#[test]
fn test_config_file_fills_only_unset_fields() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"address": "from-file:9999", "database_dsn": "postgres://file/db", "key": "file-secret"}}"#
    )
    .unwrap();

    let args = ServerArgs {
        database_dsn: Some("postgres://flag/db".to_string()),
        config: Some(file.path().to_path_buf()),
        ..ServerArgs::default()
    };

    let config = ServerConfig::resolve(args, &no_env).unwrap();

    assert_eq!(config.database_dsn.as_deref(), Some("postgres://flag/db"));
    assert_eq!(config.address, "from-file:9999");
    assert_eq!(config.signing_key.as_deref(), Some("file-secret"));
}

#[test]
fn test_snapshot_mode_selection() {
    let sync = ServerConfig::resolve(
        ServerArgs {
            store_interval: Some(0),
            ..ServerArgs::default()
        },
        &no_env,
    )
    .unwrap();
    assert!(sync.snapshots_enabled());
    assert!(sync.sync_writes());

    let interval = ServerConfig::resolve(ServerArgs::default(), &no_env).unwrap();
    assert!(interval.snapshots_enabled());
    assert!(!interval.sync_writes());

    let disabled = ServerConfig::resolve(
        ServerArgs {
            file_storage_path: Some(String::new()),
            ..ServerArgs::default()
        },
        &no_env,
    )
    .unwrap();
    assert!(!disabled.snapshots_enabled());
}

#[test]
fn test_database_dsn_disables_snapshots() {
    let config = ServerConfig::resolve(
        ServerArgs {
            database_dsn: Some("postgres://localhost/metrics".to_string()),
            ..ServerArgs::default()
        },
        &no_env,
    )
    .unwrap();

    assert!(!config.snapshots_enabled());
}

#[test]
fn test_invalid_address_is_rejected() {
    let args = ServerArgs {
        address: Some("localhost:notaport".to_string()),
        ..ServerArgs::default()
    };

    let err = ServerConfig::resolve(args, &no_env).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAddress { .. }));
}

#[test]
fn test_bad_restore_env_value_is_an_error() {
    let env = |name: &str| (name == "RESTORE").then(|| "maybe".to_string());

    let err = ServerConfig::resolve(ServerArgs::default(), &env).unwrap_err();
    assert!(matches!(err, ConfigError::BadEnvValue { .. }));
}

#[test]
fn test_missing_tls_material_is_fatal() {
    let args = ServerArgs {
        cert: Some(PathBuf::from("/definitely/not/here.pem")),
        ..ServerArgs::default()
    };

    let err = ServerConfig::resolve(args, &no_env).unwrap_err();
    assert!(matches!(err, ConfigError::MissingTlsMaterial { .. }));
}

#[test]
fn test_present_tls_material_passes_validation() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let args = ServerArgs {
        cert: Some(file.path().to_path_buf()),
        ..ServerArgs::default()
    };

    assert!(ServerConfig::resolve(args, &no_env).is_ok());
}
