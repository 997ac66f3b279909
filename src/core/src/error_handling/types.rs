use thiserror::Error;

/// Errors returned by every storage backend and by the backend loader.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Empty topic, empty or disallowed module name, empty configuration target.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The module's namespace (bucket or table) was never created.
    #[error("module not found: {0}")]
    NotFound(String),

    /// No storage kind was configured.
    #[error("storage is not configured")]
    Unconfigured,

    /// The configured storage kind is unknown.
    #[error("storage type {0} is not supported")]
    UnsupportedBackend(String),

    /// The storage handle is closed, unreachable or opened read-only.
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A stored payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The lifecycle signal fired while the operation was in flight.
    #[error("storage operation cancelled")]
    Cancelled,

    /// Relational engine failure not covered by the variants above.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Embedded engine failure not covered by the variants above.
    #[error("embedded engine error: {0}")]
    Engine(#[from] rocksdb::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                StorageError::BackendUnavailable(err.to_string())
            }
            sqlx::Error::Database(db) if db.message().starts_with("no such table") => {
                let table = db
                    .message()
                    .trim_start_matches("no such table:")
                    .trim()
                    .to_string();
                StorageError::NotFound(table)
            }
            sqlx::Error::Database(db)
                if db.message().contains("readonly")
                    || db.message().contains("unable to open database file") =>
            {
                StorageError::BackendUnavailable(db.message().to_string())
            }
            _ => StorageError::Database(err),
        }
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::BackendUnavailable(format!("storage task aborted: {}", err))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Bad address: {0}")]
    BadAddress(String),

    #[error("Ingest rule error: {0}")]
    BadIngestRule(String),

    #[error("Value out of range: {0}")]
    NotInRange(String),
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("Failed to bind web server: {0}")]
    BindFailed(String),
}
