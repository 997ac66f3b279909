//! Storer Trait
//!
//! This module defines the `Storer` trait, the capability every storage backend
//! provides to the ingestion dispatcher and the HTTP read path.
//!
//! Implementors of this trait are responsible for:
//! - Lazily creating a module's namespace on its first write
//! - Persisting one sample per write, replacing any sample with the same
//!   `(module, topic, date_time)`
//! - Returning a module's samples in a stable, backend-defined order
//! - Pivoting a module's samples into a [`View`]
//!
//! All methods return a `Result`; nothing is retried inside a backend.

use async_trait::async_trait;

use crate::error_handling::types::StorageError;
use crate::storage::types::{Data, View};

/// The `Storer` trait defines the interface for telemetry storage backends.
///
/// Backends are shared between any number of concurrent writer and reader
/// tasks, hence `Send + Sync` and `&self` receivers.
#[async_trait]
pub trait Storer: Send + Sync {
    /// Returns every sample of `module`, each tagged with the module.
    ///
    /// Fails with `NotFound` when the module was never written.
    async fn read(&self, module: &str) -> Result<Vec<Data>, StorageError>;

    /// Persists one sample, creating the module's namespace on first use.
    ///
    /// Fails with `InvalidArgument` on an empty topic or an invalid module
    /// name. An empty `date_time` is filled with the current minute.
    async fn write(&self, data: Data) -> Result<(), StorageError>;

    /// Returns the module's samples as `Topic -> DateTime -> Value`.
    ///
    /// Fails with `NotFound` when the module was never written; an existing
    /// module without samples yields an empty view.
    async fn view(&self, module: &str) -> Result<View, StorageError>;
}
