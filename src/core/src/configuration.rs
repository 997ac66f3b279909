//! Runtime configuration
//!
//! `config` holds the TOML-backed [`Config`]; `types` holds its sections.

pub mod config;
pub mod types;

pub use config::Config;
pub use types::{ServerConfig, StorageConfig};
