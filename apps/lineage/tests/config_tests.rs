//! Tests for TOML configuration loading and validation.

use lineage::config::{Config, LogFormat};
use lineage_core::{BackendKind, LineageError};
use std::path::PathBuf;

// =============================================================================
// PARSING
// =============================================================================

#[test]
fn full_document_parses() {
    let config = Config::from_toml_str(
        r#"
        [storage]
        backend = "sqlite"
        path = "catalog.sqlite"

        [ids]
        machine_id = 2
        machine_count = 4

        [logging]
        format = "json"
        filter = "lineage=debug"
        "#,
    )
    .expect("parse");

    assert_eq!(config.storage.backend, BackendKind::Sqlite);
    assert_eq!(config.storage.path, PathBuf::from("catalog.sqlite"));
    assert_eq!(config.ids.machine_id, 2);
    assert_eq!(config.ids.machine_count, 4);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.filter, "lineage=debug");
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let config = Config::from_toml_str(
        r#"
        [ids]
        machine_count = 3
        "#,
    )
    .expect("parse");

    assert_eq!(config.storage, Config::default().storage);
    assert_eq!(config.logging, Config::default().logging);
    assert_eq!(config.ids.machine_id, 0);
    assert_eq!(config.ids.machine_count, 3);
}

// =============================================================================
// VALIDATION
// =============================================================================

#[test]
fn unknown_backend_rejected() {
    let result = Config::from_toml_str("[storage]\nbackend = \"cassandra\"\n");
    assert!(matches!(result, Err(LineageError::ConfigError(_))));
}

#[test]
fn unknown_key_rejected() {
    let result = Config::from_toml_str("[storage]\nflavor = \"vanilla\"\n");
    assert!(matches!(result, Err(LineageError::ConfigError(_))));
}

#[test]
fn machine_id_must_fit_machine_count() {
    let result = Config::from_toml_str("[ids]\nmachine_id = 4\nmachine_count = 4\n");
    assert!(matches!(result, Err(LineageError::ConfigError(_))));

    let result = Config::from_toml_str("[ids]\nmachine_count = 0\n");
    assert!(matches!(result, Err(LineageError::ConfigError(_))));
}

// =============================================================================
// FILES
// =============================================================================

#[test]
fn load_reads_file_and_defaults_without_path() {
    let temp = tempfile::tempdir().expect("temp dir");
    let path = temp.path().join("lineage.toml");
    std::fs::write(&path, "[storage]\nbackend = \"memory\"\n").expect("write");

    let config = Config::load(Some(&path)).expect("load");
    assert_eq!(config.storage.backend, BackendKind::Memory);

    assert_eq!(Config::load(None).expect("defaults"), Config::default());
}

#[test]
fn missing_file_is_io_error() {
    let temp = tempfile::tempdir().expect("temp dir");
    let result = Config::load(Some(&temp.path().join("absent.toml")));
    assert!(matches!(result, Err(LineageError::IoError(_))));
}
