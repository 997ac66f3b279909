//! Error types shared across the crate.
//!
//! - [`types::StorageError`]: everything a storage backend or the loader can fail with
//! - [`types::ConfigError`]: configuration file loading and validation
//! - [`types::WebError`]: HTTP server startup

pub mod types;

pub use types::{ConfigError, StorageError, WebError};
