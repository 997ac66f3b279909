use super::types::*;
use crate::error_handling::types::ConfigError;
use crate::ingestion::rules::IngestRule;
use crate::storage::types::ModuleName;
use log::{debug, info};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

pub const ENV_STORAGE_KIND: &str = "LOGSERVER_STORAGE_KIND";
pub const ENV_STORAGE_PATH: &str = "LOGSERVER_STORAGE_PATH";

/// Application configuration structure that defines all runtime parameters.
///
/// It is read from a TOML file whose path is given on the command line, then
/// patched from the environment:
///
/// ```toml
/// log_level = "info"
///
/// [server]
/// bind_address = "127.0.0.1:8080"
///
/// [storage]
/// kind = "embedded"
/// path = "./data/logserver"
///
/// [[ingest]]
/// prefix = "croco/cave/"
/// module = "cave"
/// ```
///
/// # Fields Overview
///
/// - `log_level`: default filter for `env_logger`, overridden by `RUST_LOG`
/// - `server`: HTTP read boundary settings
/// - `storage`: backend kind, location and read-only flag
/// - `ingest`: topic routing rules used by the dispatcher
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ingest: Vec<IngestRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: String::from("info"),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            ingest: Vec::new(),
        }
    }
}

impl Config {
    /// Reads, patches and validates the configuration file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Reading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Applies `LOGSERVER_STORAGE_KIND` and `LOGSERVER_STORAGE_PATH` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(kind) = std::env::var(ENV_STORAGE_KIND) {
            debug!("storage kind overridden from environment: {}", kind);
            self.storage.kind = kind;
        }
        if let Ok(path) = std::env::var(ENV_STORAGE_PATH) {
            debug!("storage path overridden from environment: {}", path);
            self.storage.path = path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_address()?;
        for rule in &self.ingest {
            if rule.prefix.is_empty() {
                return Err(ConfigError::BadIngestRule(format!(
                    "rule for module {} has an empty prefix",
                    rule.module
                )));
            }
            ModuleName::parse(&rule.module)
                .map_err(|e| ConfigError::BadIngestRule(e.to_string()))?;
            if let Some([low, high]) = rule.numeric_range {
                if low > high {
                    return Err(ConfigError::NotInRange(format!(
                        "numeric_range [{}, {}] for {} is not ordered",
                        low, high, rule.prefix
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::BadAddress(self.server.bind_address.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
log_level = "debug"

[server]
bind_address = "0.0.0.0:9000"

[storage]
kind = "relational"
path = "/tmp/logserver.db"

[[ingest]]
prefix = "croco/cave/"
module = "cave"
[ingest.topics]
temperature = "temp"
heater = "heater"

[[ingest]]
prefix = "ESP32-A473F53A7D80/p/ds18b20/"
module = "probes"
topic_prefix = "ds18b20/"
numeric_range = [0.0, 100.0]
"#;

    fn clear_env() {
        std::env::remove_var(ENV_STORAGE_KIND);
        std::env::remove_var(ENV_STORAGE_PATH);
    }

    #[test]
    fn test_parse_full_document() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.storage, StorageConfig::new("relational", "/tmp/logserver.db"));
        assert_eq!(config.ingest.len(), 2);
        assert_eq!(config.ingest[0].topics["temperature"], "temp");
        assert_eq!(config.ingest[1].numeric_range, Some([0.0, 100.0]));
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bind_address().unwrap().port(), 8080);
    }

    #[test]
    fn test_bad_bind_address() {
        let config = Config::from_toml_str("[server]\nbind_address = \"nowhere\"").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::BadAddress(_))));
    }

    #[test]
    fn test_rule_with_invalid_module() {
        let raw = "[[ingest]]\nprefix = \"a/\"\nmodule = \"bad name\"";
        let config = Config::from_toml_str(raw).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::BadIngestRule(_))));
    }

    #[test]
    fn test_rule_with_reversed_range() {
        let raw = "[[ingest]]\nprefix = \"a/\"\nmodule = \"m\"\nnumeric_range = [10.0, 1.0]";
        let config = Config::from_toml_str(raw).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NotInRange(_))));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            Config::from_toml_str("[storage"),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    #[serial]
    fn test_from_file_applies_env_overrides() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        std::env::set_var(ENV_STORAGE_KIND, "memory");
        std::env::set_var(ENV_STORAGE_PATH, "/elsewhere");
        let config = Config::from_file(file.path());
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.storage.kind, "memory");
        assert_eq!(config.storage.path, "/elsewhere");
    }

    #[test]
    #[serial]
    fn test_from_file_missing() {
        clear_env();
        let result = Config::from_file(Path::new("/nonexistent/logserver.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
