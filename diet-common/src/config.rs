//! Configuration loading
//!
//! Settings are resolved once at startup and passed explicitly into the store and
//! query engine. Priority order:
//! 1. Command-line flags (applied by each binary after [`Settings::load`])
//! 2. Environment variables
//! 3. TOML config file
//! 4. Built-in defaults
//!
//! A backend whose required connection setting is absent is a [`Error::Config`] at
//! startup, never a per-request failure.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default page size shared by every backend
pub const DEFAULT_PAGE_SIZE: u32 = 9;
/// Default fields searched by free-text queries
pub const DEFAULT_SEARCH_FIELDS: &[&str] = &["recipe_name", "diet_type", "cuisine_type"];
pub const DEFAULT_COLLECTION: &str = "cleanedData";
pub const DEFAULT_CONTAINER: &str = "data";
pub const DEFAULT_BLOB: &str = "clean_diets.csv";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_API_PORT: u16 = 5750;

pub const ENV_BACKEND: &str = "DIET_BACKEND";
pub const ENV_DB_URL: &str = "DIET_DB_URL";
pub const ENV_DB_COLLECTION: &str = "DIET_DB_COLLECTION";
pub const ENV_INSERT_BATCH_SIZE: &str = "DIET_INSERT_BATCH_SIZE";
pub const ENV_STORAGE_ROOT: &str = "DIET_STORAGE_ROOT";
pub const ENV_STORAGE_CONTAINER: &str = "DIET_STORAGE_CONTAINER";
pub const ENV_STORAGE_BLOB: &str = "DIET_STORAGE_BLOB";
pub const ENV_PAGE_SIZE: &str = "DIET_PAGE_SIZE";
pub const ENV_SEARCH_FIELDS: &str = "DIET_SEARCH_FIELDS";
pub const ENV_SEARCH_ALL_FIELDS: &str = "DIET_SEARCH_ALL_FIELDS";
pub const ENV_DISPLAY_PROJECTION: &str = "DIET_DISPLAY_PROJECTION";
pub const ENV_STORE_TIMEOUT_MS: &str = "DIET_STORE_TIMEOUT_MS";
pub const ENV_API_PORT: &str = "DIET_API_PORT";

/// Bootstrap configuration as read from a TOML file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub store_timeout_ms: Option<u64>,
    #[serde(default)]
    pub document: TomlDocument,
    #[serde(default)]
    pub flat_file: TomlFlatFile,
    #[serde(default)]
    pub query: TomlQuery,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlDocument {
    pub url: Option<String>,
    pub collection: Option<String>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlFlatFile {
    pub root: Option<PathBuf>,
    pub container: Option<String>,
    pub blob: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlQuery {
    pub default_page_size: Option<u32>,
    pub search_fields: Option<Vec<String>>,
    pub search_all_fields: Option<bool>,
    pub display_projection: Option<bool>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which physical store answers ingestion and queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// One JSON document per record in a SQLite collection table
    Document,
    /// One canonical CSV blob in a directory-backed object store
    FlatFile,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "documents" | "db" => Ok(BackendKind::Document),
            "flat-file" | "flat_file" | "flatfile" | "blob" => Ok(BackendKind::FlatFile),
            other => Err(Error::Config(format!(
                "unknown backend '{}' (expected 'document' or 'flat-file')",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Document => "document",
            BackendKind::FlatFile => "flat-file",
        }
    }
}

/// Document backend connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSettings {
    /// SQLite connection URL, e.g. `sqlite:///var/lib/diet/recipes.db`
    pub url: String,
    /// Collection (table) holding one document per record
    pub collection: String,
    /// Records per insert batch during replace
    pub batch_size: usize,
}

/// Flat-file backend location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatFileSettings {
    /// Object-store root directory
    pub root: PathBuf,
    /// Container directory under the root
    pub container: String,
    /// Canonical blob name inside the container
    pub blob: String,
}

impl FlatFileSettings {
    pub fn container_path(&self) -> PathBuf {
        self.root.join(&self.container)
    }

    pub fn blob_path(&self) -> PathBuf {
        self.container_path().join(&self.blob)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSettings {
    Document(DocumentSettings),
    FlatFile(FlatFileSettings),
}

impl BackendSettings {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendSettings::Document(_) => BackendKind::Document,
            BackendSettings::FlatFile(_) => BackendKind::FlatFile,
        }
    }
}

/// Query behaviour shared by every backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    pub default_page_size: u32,
    /// Fields matched by `search`; ignored when `search_all_fields` is set
    pub search_fields: Vec<String>,
    /// Match `search` against the string form of every field
    pub search_all_fields: bool,
    /// Return display-projected records unless the request overrides it
    pub display_projection: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            search_fields: DEFAULT_SEARCH_FIELDS.iter().map(|s| s.to_string()).collect(),
            search_all_fields: false,
            display_projection: false,
        }
    }
}

/// Fully resolved process configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: BackendSettings,
    pub query: QuerySettings,
    /// Upper bound for every backend call
    pub store_timeout: Duration,
    /// HTTP port for the query service
    pub port: u16,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from an optional TOML file plus the process environment
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) => read_toml_config(path)?,
            None => TomlConfig::default(),
        };
        Self::resolve(toml_config, |key| std::env::var(key).ok())
    }

    /// Resolve settings from a parsed TOML file and an environment lookup
    pub fn resolve<F>(toml_config: TomlConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let kind = match env(ENV_BACKEND).or(toml_config.backend.clone()) {
            Some(value) => BackendKind::parse(&value)?,
            None => BackendKind::Document,
        };

        let backend = match kind {
            BackendKind::Document => {
                let url = env(ENV_DB_URL)
                    .or(toml_config.document.url.clone())
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "{} is required for the document backend",
                            ENV_DB_URL
                        ))
                    })?;
                let collection = env(ENV_DB_COLLECTION)
                    .or(toml_config.document.collection.clone())
                    .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
                validate_collection_name(&collection)?;
                let batch_size = match env(ENV_INSERT_BATCH_SIZE) {
                    Some(v) => parse_positive::<usize>(ENV_INSERT_BATCH_SIZE, &v)?,
                    None => toml_config.document.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
                };
                if batch_size == 0 {
                    return Err(Error::Config("insert batch size must be positive".into()));
                }
                BackendSettings::Document(DocumentSettings {
                    url,
                    collection,
                    batch_size,
                })
            }
            BackendKind::FlatFile => {
                let root = env(ENV_STORAGE_ROOT)
                    .map(PathBuf::from)
                    .or(toml_config.flat_file.root.clone())
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "{} is required for the flat-file backend",
                            ENV_STORAGE_ROOT
                        ))
                    })?;
                let container = env(ENV_STORAGE_CONTAINER)
                    .or(toml_config.flat_file.container.clone())
                    .unwrap_or_else(|| DEFAULT_CONTAINER.to_string());
                let blob = env(ENV_STORAGE_BLOB)
                    .or(toml_config.flat_file.blob.clone())
                    .unwrap_or_else(|| DEFAULT_BLOB.to_string());
                validate_object_name("container", &container)?;
                validate_object_name("blob", &blob)?;
                BackendSettings::FlatFile(FlatFileSettings {
                    root,
                    container,
                    blob,
                })
            }
        };

        let default_page_size = match env(ENV_PAGE_SIZE) {
            Some(v) => parse_positive::<u32>(ENV_PAGE_SIZE, &v)?,
            None => toml_config.query.default_page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        };
        if default_page_size == 0 {
            return Err(Error::Config("default page size must be positive".into()));
        }

        let search_fields = match env(ENV_SEARCH_FIELDS) {
            Some(v) => v.split(',').map(str::to_string).collect(),
            None => toml_config
                .query
                .search_fields
                .clone()
                .unwrap_or_else(|| QuerySettings::default().search_fields),
        };
        let search_fields = validate_search_fields(search_fields)?;

        let search_all_fields = match env(ENV_SEARCH_ALL_FIELDS) {
            Some(v) => parse_bool(ENV_SEARCH_ALL_FIELDS, &v)?,
            None => toml_config.query.search_all_fields.unwrap_or(false),
        };
        let display_projection = match env(ENV_DISPLAY_PROJECTION) {
            Some(v) => parse_bool(ENV_DISPLAY_PROJECTION, &v)?,
            None => toml_config.query.display_projection.unwrap_or(false),
        };

        let timeout_ms = match env(ENV_STORE_TIMEOUT_MS) {
            Some(v) => parse_positive::<u64>(ENV_STORE_TIMEOUT_MS, &v)?,
            None => toml_config.store_timeout_ms.unwrap_or(DEFAULT_STORE_TIMEOUT_MS),
        };
        if timeout_ms == 0 {
            return Err(Error::Config("store timeout must be positive".into()));
        }

        let port = match env(ENV_API_PORT) {
            Some(v) => v
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("{} is not a valid port: {}", ENV_API_PORT, v)))?,
            None => toml_config.port.unwrap_or(DEFAULT_API_PORT),
        };

        Ok(Settings {
            backend,
            query: QuerySettings {
                default_page_size,
                search_fields,
                search_all_fields,
                display_projection,
            },
            store_timeout: Duration::from_millis(timeout_ms),
            port,
            logging: toml_config.logging,
        })
    }
}

/// Read and parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Collection names are interpolated into SQL, so restrict them to `[A-Za-z0-9_]`
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() < 100
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("Invalid collection name: {}", name)))
    }
}

fn validate_object_name(what: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("Invalid {} name: {}", what, name)))
    }
}

fn validate_search_fields(fields: Vec<String>) -> Result<Vec<String>> {
    let fields: Vec<String> = fields
        .into_iter()
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect();

    if fields.is_empty() {
        return Err(Error::Config("search field list is empty".into()));
    }
    if let Some(bad) = fields.iter().find(|f| f.contains('"')) {
        return Err(Error::Config(format!("Invalid search field: {}", bad)));
    }
    Ok(fields)
}

fn parse_positive<T: std::str::FromStr + Default + PartialEq>(key: &str, value: &str) -> Result<T> {
    match value.trim().parse::<T>() {
        Ok(v) if v != T::default() => Ok(v),
        _ => Err(Error::Config(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{} must be a boolean, got '{}'", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_document_backend_defaults() {
        let settings =
            Settings::resolve(TomlConfig::default(), env_of(&[(ENV_DB_URL, "sqlite://r.db")]))
                .unwrap();

        assert_eq!(
            settings.backend,
            BackendSettings::Document(DocumentSettings {
                url: "sqlite://r.db".into(),
                collection: DEFAULT_COLLECTION.into(),
                batch_size: DEFAULT_BATCH_SIZE,
            })
        );
        assert_eq!(settings.query, QuerySettings::default());
        assert_eq!(settings.query.default_page_size, 9);
        assert_eq!(settings.store_timeout, Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS));
        assert_eq!(settings.port, DEFAULT_API_PORT);
    }

    #[test]
    fn test_missing_db_url_is_config_error() {
        let err = Settings::resolve(TomlConfig::default(), env_of(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains(ENV_DB_URL)));
    }

    #[test]
    fn test_missing_storage_root_is_config_error() {
        let err = Settings::resolve(
            TomlConfig::default(),
            env_of(&[(ENV_BACKEND, "flat-file")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains(ENV_STORAGE_ROOT)));
    }

    #[test]
    fn test_flat_file_paths() {
        let settings = Settings::resolve(
            TomlConfig::default(),
            env_of(&[(ENV_BACKEND, "flat-file"), (ENV_STORAGE_ROOT, "/srv/blobs")]),
        )
        .unwrap();

        match settings.backend {
            BackendSettings::FlatFile(ff) => {
                assert_eq!(ff.blob_path(), PathBuf::from("/srv/blobs/data/clean_diets.csv"));
            }
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            backend = "document"
            port = 6000

            [document]
            url = "sqlite://from-toml.db"
            collection = "fromToml"

            [query]
            default_page_size = 5
            search_all_fields = true
            "#,
        )
        .unwrap();

        let settings = Settings::resolve(
            toml_config,
            env_of(&[(ENV_DB_COLLECTION, "fromEnv"), (ENV_PAGE_SIZE, "12")]),
        )
        .unwrap();

        match &settings.backend {
            BackendSettings::Document(doc) => {
                assert_eq!(doc.url, "sqlite://from-toml.db");
                assert_eq!(doc.collection, "fromEnv");
            }
            other => panic!("unexpected backend {:?}", other),
        }
        assert_eq!(settings.query.default_page_size, 12);
        assert!(settings.query.search_all_fields);
        assert_eq!(settings.port, 6000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = [(ENV_DB_URL, "sqlite://r.db")];

        for (key, value) in [
            (ENV_PAGE_SIZE, "0"),
            (ENV_PAGE_SIZE, "nine"),
            (ENV_INSERT_BATCH_SIZE, "-1"),
            (ENV_DB_COLLECTION, "drop table;"),
            (ENV_SEARCH_ALL_FIELDS, "maybe"),
            (ENV_SEARCH_FIELDS, "a\"b"),
            (ENV_BACKEND, "cassandra"),
        ] {
            let mut pairs = base.to_vec();
            pairs.push((key, value));
            let result = Settings::resolve(TomlConfig::default(), env_of(&pairs));
            assert!(
                matches!(result, Err(Error::Config(_))),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_search_fields_normalized() {
        let settings = Settings::resolve(
            TomlConfig::default(),
            env_of(&[(ENV_DB_URL, "sqlite://r.db"), (ENV_SEARCH_FIELDS, " Recipe_Name , ,cuisine_type")]),
        )
        .unwrap();
        assert_eq!(settings.query.search_fields, vec!["recipe_name", "cuisine_type"]);
    }

    #[test]
    fn test_unknown_toml_key_rejected() {
        let parsed: std::result::Result<TomlConfig, _> = toml::from_str("colour = \"blue\"");
        assert!(parsed.is_err());
    }
}
