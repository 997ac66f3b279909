//! Backend factory
//!
//! Turns a [`StorageConfig`] into a ready [`Backend`]. The set of backends is
//! closed: adding one means adding a variant here.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use log::info;

use crate::configuration::types::StorageConfig;
use crate::error_handling::types::StorageError;
use crate::storage::database_storage::DatabaseStorage;
use crate::storage::embedded_storage::EmbeddedStorage;
use crate::storage::lifecycle::Shutdown;
use crate::storage::memory_storage::MemoryStorage;
use crate::storage::storage_trait::Storer;
use crate::storage::types::{Data, View};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Embedded,
    Relational,
    Memory,
}

impl FromStr for StorageKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Err(StorageError::Unconfigured),
            "embedded" | "rocksdb" => Ok(StorageKind::Embedded),
            "relational" | "sqlite" => Ok(StorageKind::Relational),
            "memory" => Ok(StorageKind::Memory),
            _ => Err(StorageError::UnsupportedBackend(s.to_string())),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageKind::Embedded => "embedded",
            StorageKind::Relational => "relational",
            StorageKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// One of the supported storage backends.
pub enum Backend {
    Embedded(EmbeddedStorage),
    Relational(DatabaseStorage),
    Memory(MemoryStorage),
}

impl Backend {
    pub fn kind(&self) -> StorageKind {
        match self {
            Backend::Embedded(_) => StorageKind::Embedded,
            Backend::Relational(_) => StorageKind::Relational,
            Backend::Memory(_) => StorageKind::Memory,
        }
    }

    /// Names of the modules currently present in the store.
    pub async fn modules(&self) -> Result<Vec<String>, StorageError> {
        match self {
            Backend::Embedded(s) => Ok(s.modules()),
            Backend::Relational(s) => s.modules().await,
            Backend::Memory(s) => Ok(s.modules()),
        }
    }

    /// Releases the underlying handle. Safe to call more than once.
    pub async fn close(&self) {
        match self {
            Backend::Embedded(s) => s.close(),
            Backend::Relational(s) => s.close().await,
            Backend::Memory(s) => s.close(),
        }
    }
}

#[async_trait]
impl Storer for Backend {
    async fn read(&self, module: &str) -> Result<Vec<Data>, StorageError> {
        match self {
            Backend::Embedded(s) => s.read(module).await,
            Backend::Relational(s) => s.read(module).await,
            Backend::Memory(s) => s.read(module).await,
        }
    }

    async fn write(&self, data: Data) -> Result<(), StorageError> {
        match self {
            Backend::Embedded(s) => s.write(data).await,
            Backend::Relational(s) => s.write(data).await,
            Backend::Memory(s) => s.write(data).await,
        }
    }

    async fn view(&self, module: &str) -> Result<View, StorageError> {
        match self {
            Backend::Embedded(s) => s.view(module).await,
            Backend::Relational(s) => s.view(module).await,
            Backend::Memory(s) => s.view(module).await,
        }
    }
}

/// Builds the backend named by `config.kind`.
///
/// Fails with `Unconfigured` on an empty kind, `UnsupportedBackend` on an
/// unknown one, `InvalidArgument` when a persistent backend has no path and
/// `BackendUnavailable` when the store cannot be opened.
pub async fn load(config: &StorageConfig, shutdown: Shutdown) -> Result<Backend, StorageError> {
    let kind: StorageKind = config.kind.parse()?;
    if kind != StorageKind::Memory && config.path.is_empty() {
        return Err(StorageError::InvalidArgument(format!(
            "storage kind {} requires a path",
            kind
        )));
    }
    info!("loading {} storage", kind);

    let backend = match kind {
        StorageKind::Embedded => Backend::Embedded(
            EmbeddedStorage::open(&config.path, config.read_only, shutdown).await?,
        ),
        StorageKind::Relational => Backend::Relational(
            DatabaseStorage::open(&config.path, config.read_only, shutdown).await?,
        ),
        StorageKind::Memory => Backend::Memory(MemoryStorage::new(shutdown)),
    };
    Ok(backend)
}
