use serde::Deserialize;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

/// `[server]` section: where the HTTP read boundary listens.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from(DEFAULT_BIND_ADDRESS),
        }
    }
}

/// `[storage]` section: which backend the loader builds.
///
/// `kind` is kept as free text so that an unknown or empty kind surfaces as a
/// storage error at load time rather than a parse error.
#[derive(Debug, PartialEq, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: String,
    pub path: String,
    pub read_only: bool,
}

impl StorageConfig {
    pub fn new(kind: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
            read_only: false,
        }
    }
}
