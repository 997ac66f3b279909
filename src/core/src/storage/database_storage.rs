use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::error_handling::types::StorageError;
use crate::storage::activation::ActivationCache;
use crate::storage::lifecycle::Shutdown;
use crate::storage::storage_trait::Storer;
use crate::storage::types::{Data, ModuleName, View};
use crate::storage::view::pivot;

// Internal row mapping for samples to avoid manual try_get
#[derive(Debug, sqlx::FromRow)]
struct SampleRow {
    #[sqlx(rename = "DateTime")]
    date_time: String,
    #[sqlx(rename = "Topic")]
    topic: String,
    #[sqlx(rename = "Value")]
    value: String,
}

impl SampleRow {
    fn into_data(self, module: &ModuleName) -> Data {
        Data {
            module: module.to_string(),
            date_time: self.date_time,
            topic: self.topic,
            value: self.value,
        }
    }
}

/// Quotes a validated module name as an SQL identifier.
fn table_ident(module: &ModuleName) -> String {
    format!("\"{}\"", module.as_str().replace('"', "\"\""))
}

/// Relational backend on SQLite: one table per module.
///
/// Each table has `PRIMARY KEY (Topic, DateTime)` and writes are upserts, so a
/// repeated `(topic, date_time)` replaces the stored value exactly like the
/// embedded backend does.
pub struct DatabaseStorage {
    pool: Pool<Sqlite>,
    read_only: bool,
    activation: ActivationCache,
    shutdown: Shutdown,
}

impl DatabaseStorage {
    const MAX_CONNECTIONS: u32 = 5;
    const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Opens the database at `target`, either a file path or a `sqlite:` URL.
    ///
    /// The pool is closed once `shutdown` fires.
    pub async fn open(
        target: &str,
        read_only: bool,
        shutdown: Shutdown,
    ) -> Result<Self, StorageError> {
        if target.is_empty() {
            return Err(StorageError::InvalidArgument("database path is empty".into()));
        }
        let opts = Self::connect_options(target, read_only)?;
        let max_connections = if target.contains(":memory:") {
            1
        } else {
            Self::MAX_CONNECTIONS
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        info!(
            "relational store opened at {}{}",
            target,
            if read_only { " (read-only)" } else { "" }
        );

        let closing = pool.clone();
        let name = target.to_string();
        shutdown.on_trigger(move || async move {
            closing.close().await;
            info!("relational store at {} closed", name);
        });

        Ok(Self {
            pool,
            read_only,
            activation: ActivationCache::new(),
            shutdown,
        })
    }

    fn connect_options(target: &str, read_only: bool) -> Result<SqliteConnectOptions, StorageError> {
        let opts = if target.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(target).map_err(|e| {
                StorageError::InvalidArgument(format!("bad database url {}: {}", target, e))
            })?
        } else {
            let path = Path::new(target);
            if !read_only {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StorageError::BackendUnavailable(format!("{}: {}", parent.display(), e))
                    })?;
                }
            }
            SqliteConnectOptions::new().filename(path)
        };
        let opts = opts
            .create_if_missing(!read_only)
            .read_only(read_only)
            .busy_timeout(Self::BUSY_TIMEOUT);
        Ok(if read_only {
            opts
        } else {
            opts.journal_mode(SqliteJournalMode::Wal)
        })
    }

    /// Closes the pool. Later calls fail with `BackendUnavailable`.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("relational store closed");
        }
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::BackendUnavailable(
                "database is opened read-only".into(),
            ));
        }
        Ok(())
    }

    async fn namespace_exists(&self, module: &ModuleName) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )
        .bind(module.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Idempotent "create if absent"; a concurrent creator winning the race
    /// counts as success.
    async fn create_namespace(&self, module: &ModuleName) -> Result<(), StorageError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                DateTime TEXT NOT NULL,
                Topic TEXT NOT NULL,
                Value TEXT NOT NULL,
                PRIMARY KEY (Topic, DateTime)
            )",
            table_ident(module)
        );
        match sqlx::query(&sql).execute(&self.pool).await {
            Ok(_) => {
                debug!("relational namespace ensured: {}", module);
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.message().contains("already exists") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, module: &ModuleName, data: &Data) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO {} (DateTime, Topic, Value) VALUES (?1, ?2, ?3)
             ON CONFLICT(Topic, DateTime) DO UPDATE SET Value = excluded.Value",
            table_ident(module)
        );
        sqlx::query(&sql)
            .bind(&data.date_time)
            .bind(&data.topic)
            .bind(&data.value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn select_rows(
        &self,
        module: &ModuleName,
        order_by: &str,
    ) -> Result<Vec<Data>, StorageError> {
        if !self.namespace_exists(module).await? {
            return Err(StorageError::NotFound(module.to_string()));
        }
        let sql = format!(
            "SELECT DateTime, Topic, Value FROM {} ORDER BY {}",
            table_ident(module),
            order_by
        );
        let rows: Vec<SampleRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.into_data(module)).collect())
    }

    /// Drops the module's table and clears its activation.
    pub async fn cleanup(&self, module: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        let module = ModuleName::parse(module)?;
        let sql = format!("DROP TABLE IF EXISTS {}", table_ident(&module));
        self.shutdown
            .guard(async {
                sqlx::query(&sql).execute(&self.pool).await?;
                Ok::<_, StorageError>(())
            })
            .await?;
        self.activation.deactivate(&module);
        debug!("relational namespace dropped: {}", module);
        Ok(())
    }

    /// Modules that currently have a table.
    pub async fn modules(&self) -> Result<Vec<String>, StorageError> {
        let names: Vec<String> = self
            .shutdown
            .guard(async {
                let names: Vec<String> = sqlx::query_scalar(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )
                .fetch_all(&self.pool)
                .await?;
                Ok::<_, StorageError>(names)
            })
            .await?;
        Ok(names
            .into_iter()
            .filter(|n| ModuleName::parse(n).is_ok())
            .collect())
    }
}

#[async_trait]
impl Storer for DatabaseStorage {
    async fn read(&self, module: &str) -> Result<Vec<Data>, StorageError> {
        let module = ModuleName::parse(module)?;
        self.shutdown
            .guard(self.select_rows(&module, "Topic, DateTime"))
            .await
    }

    async fn write(&self, data: Data) -> Result<(), StorageError> {
        let module = data.validate()?;
        self.check_writable()?;
        let data = data.with_default_timestamp();

        self.shutdown
            .guard(async {
                self.activation
                    .ensure_active(&module, || self.create_namespace(&module))
                    .await?;
                match self.upsert(&module, &data).await {
                    Err(StorageError::NotFound(_)) => {
                        // table dropped behind the cache's back
                        warn!("relational namespace {} vanished, recreating", module);
                        self.activation.deactivate(&module);
                        self.activation
                            .ensure_active(&module, || self.create_namespace(&module))
                            .await?;
                        self.upsert(&module, &data).await
                    }
                    res => res,
                }
            })
            .await?;

        debug!(
            "relational saved to [{}]: {} {} = {}",
            module, data.topic, data.date_time, data.value
        );
        Ok(())
    }

    async fn view(&self, module: &str) -> Result<View, StorageError> {
        let module = ModuleName::parse(module)?;
        let rows = self
            .shutdown
            .guard(self.select_rows(&module, "DateTime, Topic"))
            .await?;
        Ok(pivot(rows))
    }
}
