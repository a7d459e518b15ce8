//! Configuration file handling.
//!
//! This module provides loading and parsing of `.mvc_core.json` configuration
//! files: database groups, URI handling, routing rules and the log level.
//! `AppConfig` exposes the same file as a dotted key lookup through
//! `ConfigProvider` for code that reads free-form settings.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::config::{ConnectionParams, DatabaseConfig};
use crate::web::router::RouteRule;
use crate::web::uri::UriProtocol;
use crate::web::url::UrlFormat;

pub const CONFIG_FILE_NAME: &str = ".mvc_core.json";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Configuration file not found: {0}\n\n\
         Please create a .mvc_core.json file in the current directory, e.g.\n\
         {{\n  \"database\": {{\n    \"active_group\": \"default\",\n    \
         \"groups\": {{ \"default\": \"sqlite::memory:\" }}\n  }}\n}}"
    )]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Invalid JSON in {path}: {message}")]
    InvalidJson { path: PathBuf, message: String },

    #[error("You have specified an invalid database connection group '{0}'")]
    MissingGroup(String),

    #[error("Invalid DB connection string '{dsn}': {message}")]
    InvalidDsn { dsn: String, message: String },

    #[error("Invalid directory: {0}")]
    InvalidDirectory(PathBuf),
}

impl ConfigError {
    /// Stable key for localized error messages.
    pub fn message_key(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "config_file_missing",
            ConfigError::Read { .. } => "config_read_failed",
            ConfigError::InvalidJson { .. } => "config_invalid_json",
            ConfigError::MissingGroup(_) => "db_invalid_group",
            ConfigError::InvalidDsn { .. } => "db_invalid_connection_str",
            ConfigError::InvalidDirectory(_) => "invalid_directory",
        }
    }
}

/// Top-level configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSection>,
    #[serde(default)]
    pub uri: UriConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// A group given either as a DSN string or as structured parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupEntry {
    Dsn(String),
    Params(ConnectionParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_group")]
    pub active_group: String,
    pub groups: BTreeMap<String, GroupEntry>,
}

fn default_group() -> String {
    "default".to_string()
}

impl DatabaseSection {
    /// Parse every group, DSN strings included.
    pub fn to_database_config(&self) -> Result<DatabaseConfig, ConfigError> {
        let groups = self
            .groups
            .iter()
            .map(|(name, entry)| {
                let params = match entry {
                    GroupEntry::Dsn(dsn) => ConnectionParams::from_dsn(dsn)?,
                    GroupEntry::Params(params) => params.clone(),
                };
                Ok((name.clone(), params))
            })
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        if !groups.contains_key(&self.active_group) {
            return Err(ConfigError::MissingGroup(self.active_group.clone()));
        }

        Ok(DatabaseConfig {
            active_group: self.active_group.clone(),
            groups,
        })
    }
}

/// URI detection and URL building settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UriConfig {
    pub uri_protocol: UriProtocol,
    /// Character class body of the segment whitelist. Empty disables it.
    pub permitted_uri_chars: String,
    pub enable_query_strings: bool,
    pub url_suffix: String,
    pub base_url: String,
    pub script_name: String,
    pub show_script_name: bool,
    pub url_format: UrlFormat,
    pub controller_trigger: String,
    pub function_trigger: String,
    pub module_trigger: String,
}

impl Default for UriConfig {
    fn default() -> Self {
        Self {
            uri_protocol: UriProtocol::Auto,
            permitted_uri_chars: r"a-z 0-9~%.:_\-".to_string(),
            enable_query_strings: false,
            url_suffix: String::new(),
            base_url: String::new(),
            script_name: "index.php".to_string(),
            show_script_name: false,
            url_format: UrlFormat::Path,
            controller_trigger: "c".to_string(),
            function_trigger: "a".to_string(),
            module_trigger: "m".to_string(),
        }
    }
}

/// Routing: default controller, 404 override and ordered rewrite rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    pub default_controller: String,
    #[serde(rename = "404_override")]
    pub override_404: String,
    pub rules: Vec<RouteRule>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            default_controller: "site".to_string(),
            override_404: String::new(),
            rules: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// Load configuration from `.mvc_core.json` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file doesn't exist
    /// - The file cannot be read
    /// - The JSON is invalid
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE_NAME))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let value = read_json(path)?;
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidJson {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::InvalidJson {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Key/value lookup over application settings.
pub trait ConfigProvider {
    /// Look up a dotted key such as `uri.url_suffix`.
    fn get(&self, key: &str) -> Option<&serde_json::Value>;

    /// A whole section as an object.
    fn section(&self, name: &str) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.get(name).and_then(|v| v.as_object())
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }
}

/// Parsed configuration plus the raw document for free-form lookups.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    raw: serde_json::Value,
    file: ConfigFile,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE_NAME))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = read_json(path)?;
        let file = serde_json::from_value(raw.clone()).map_err(|e| ConfigError::InvalidJson {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self { raw, file })
    }

    /// Build from an already parsed file, e.g. in tests.
    pub fn from_file(file: ConfigFile) -> Self {
        let raw = serde_json::to_value(&file).unwrap_or_default();
        Self { raw, file }
    }

    pub fn file(&self) -> &ConfigFile {
        &self.file
    }

    pub fn uri(&self) -> &UriConfig {
        &self.file.uri
    }

    pub fn routes(&self) -> &RoutesConfig {
        &self.file.routes
    }
}

impl ConfigProvider for AppConfig {
    fn get(&self, key: &str) -> Option<&serde_json::Value> {
        let pointer = format!("/{}", key.replace('.', "/"));
        self.raw.pointer(&pointer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
    {
        "database": {
            "active_group": "default",
            "groups": {
                "default": "sqlite::memory:",
                "reporting": {
                    "dbdriver": "postgre",
                    "hostname": "localhost",
                    "database": "reports",
                    "active_record": false
                }
            }
        },
        "uri": { "url_suffix": ".html", "url_format": "get" },
        "routes": {
            "default_controller": "welcome",
            "404_override": "errors/missing",
            "rules": [ { "pattern": "product/(:num)", "target": "catalog/show/$1" } ]
        },
        "app": { "name": "demo" }
    }
    "#;

    #[test]
    fn test_deserialize_full_file() {
        let config: ConfigFile = serde_json::from_str(SAMPLE).unwrap();
        let db = config.database.unwrap().to_database_config().unwrap();
        assert_eq!(db.active_group, "default");
        assert_eq!(db.group("default").unwrap().database, ":memory:");
        assert!(!db.group("reporting").unwrap().active_record);
        assert_eq!(config.uri.url_suffix, ".html");
        assert_eq!(config.uri.url_format, UrlFormat::Get);
        assert_eq!(config.uri.controller_trigger, "c");
        assert_eq!(config.routes.override_404, "errors/missing");
        assert_eq!(config.routes.rules.len(), 1);
    }

    #[test]
    fn test_missing_active_group() {
        let json = r#"{ "database": { "active_group": "nope", "groups": {} } }"#;
        let config: ConfigFile = serde_json::from_str(json).unwrap();
        let err = config.database.unwrap().to_database_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingGroup(ref g) if g == "nope"));
    }

    #[test]
    fn test_provider_dotted_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, SAMPLE).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.get_str("app.name"), Some("demo"));
        assert_eq!(config.get_str("uri.url_suffix"), Some(".html"));
        assert!(config.section("routes").is_some());
        assert!(config.get("app.missing").is_none());
        assert_eq!(config.routes().default_controller, "welcome");
    }

    #[test]
    #[serial]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let old_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = ConfigFile::load();
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
        assert!(result.unwrap_err().to_string().contains("not found"));

        std::env::set_current_dir(old_dir).unwrap();
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ invalid json }").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert_eq!(err.message_key(), "config_invalid_json");
    }

    #[test]
    fn test_defaults_without_sections() {
        let config: ConfigFile = serde_json::from_str("{}").unwrap();
        assert!(config.database.is_none());
        assert_eq!(config.uri, UriConfig::default());
        assert_eq!(config.routes.default_controller, "site");
    }
}
