//! Settings loading against the real process environment and TOML files
//!
//! Uses serial_test: every test here touches DIET_* environment variables, so they
//! run one at a time.

use diet_common::config::{
    BackendKind, BackendSettings, Settings, ENV_API_PORT, ENV_BACKEND, ENV_DB_COLLECTION,
    ENV_DB_URL, ENV_DISPLAY_PROJECTION, ENV_INSERT_BATCH_SIZE, ENV_PAGE_SIZE,
    ENV_SEARCH_ALL_FIELDS, ENV_SEARCH_FIELDS, ENV_STORAGE_BLOB, ENV_STORAGE_CONTAINER,
    ENV_STORAGE_ROOT, ENV_STORE_TIMEOUT_MS,
};
use diet_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const ALL_VARS: &[&str] = &[
    ENV_BACKEND,
    ENV_DB_URL,
    ENV_DB_COLLECTION,
    ENV_INSERT_BATCH_SIZE,
    ENV_STORAGE_ROOT,
    ENV_STORAGE_CONTAINER,
    ENV_STORAGE_BLOB,
    ENV_PAGE_SIZE,
    ENV_SEARCH_FIELDS,
    ENV_SEARCH_ALL_FIELDS,
    ENV_DISPLAY_PROJECTION,
    ENV_STORE_TIMEOUT_MS,
    ENV_API_PORT,
];

fn clear_env() {
    for var in ALL_VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_document_backend_from_env() {
    clear_env();
    env::set_var(ENV_DB_URL, "sqlite::memory:");
    env::set_var(ENV_PAGE_SIZE, "12");

    let settings = Settings::load(None).unwrap();
    assert_eq!(settings.backend.kind(), BackendKind::Document);
    match &settings.backend {
        BackendSettings::Document(doc) => {
            assert_eq!(doc.url, "sqlite::memory:");
            assert_eq!(doc.collection, "cleanedData");
            assert_eq!(doc.batch_size, 100);
        }
        other => panic!("Expected document settings, got {:?}", other),
    }
    assert_eq!(settings.query.default_page_size, 12);
    assert_eq!(settings.store_timeout, Duration::from_millis(10_000));

    clear_env();
}

#[test]
#[serial]
fn test_missing_connection_setting_is_config_error() {
    clear_env();

    let err = Settings::load(None).unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    env::set_var(ENV_BACKEND, "flat-file");
    let err = Settings::load(None).unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("diet.toml");
    fs::write(
        &path,
        r#"
backend = "flat-file"
port = 6000

[flat_file]
root = "/srv/recipes"
container = "incoming"

[query]
default_page_size = 20
search_all_fields = true

[logging]
level = "debug"
"#,
    )
    .unwrap();

    env::set_var(ENV_STORAGE_CONTAINER, "data");
    env::set_var(ENV_SEARCH_ALL_FIELDS, "false");

    let settings = Settings::load(Some(&path)).unwrap();
    match &settings.backend {
        BackendSettings::FlatFile(flat) => {
            assert_eq!(flat.root.to_str(), Some("/srv/recipes"));
            assert_eq!(flat.container, "data");
            assert_eq!(flat.blob, "clean_diets.csv");
        }
        other => panic!("Expected flat-file settings, got {:?}", other),
    }
    assert_eq!(settings.port, 6000);
    assert_eq!(settings.query.default_page_size, 20);
    assert!(!settings.query.search_all_fields);
    assert_eq!(settings.logging.level, "debug");

    clear_env();
}

#[test]
#[serial]
fn test_blank_env_values_are_ignored() {
    clear_env();
    env::set_var(ENV_DB_URL, "sqlite::memory:");
    env::set_var(ENV_PAGE_SIZE, "  ");

    let settings = Settings::load(None).unwrap();
    assert_eq!(settings.query.default_page_size, 9);

    clear_env();
}

#[test]
#[serial]
fn test_unknown_toml_key_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("diet.toml");
    fs::write(&path, "backend = \"document\"\nshards = 4\n").unwrap();

    let err = Settings::load(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_missing_toml_file_is_config_error() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let err = Settings::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
