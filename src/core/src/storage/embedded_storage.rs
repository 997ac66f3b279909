//! Embedded ordered key-value backend on RocksDB.
//!
//! Every module lives in its own column family named `module:<name>`. Keys are
//! `<topic>-<date_time>` and values are the JSON record `{Topic, DateTime,
//! Value}`; the module is implied by the column family and re-attached on read.
//! Iteration follows RocksDB's bytewise key order, so samples of one topic come
//! back in chronological order.
//!
//! RocksDB calls block, so they run on tokio's blocking pool. Each put is a
//! single atomic engine write; writers to different modules only contend
//! inside the engine.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use rocksdb::{
    ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, DEFAULT_COLUMN_FAMILY_NAME,
};
use serde::{Deserialize, Serialize};

use crate::error_handling::types::StorageError;
use crate::storage::activation::ActivationCache;
use crate::storage::lifecycle::Shutdown;
use crate::storage::storage_trait::Storer;
use crate::storage::types::{Data, ModuleName, View};
use crate::storage::view::pivot;

type Db = DBWithThreadMode<MultiThreaded>;

/// Column family prefix that keeps modules apart from RocksDB's own families.
const NAMESPACE_PREFIX: &str = "module:";

fn namespace(module: &str) -> String {
    format!("{}{}", NAMESPACE_PREFIX, module)
}

/// On-disk value layout. The module is deliberately absent.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StoredRecord {
    topic: String,
    date_time: String,
    value: String,
}

impl StoredRecord {
    fn into_data(self, module: &str) -> Data {
        Data {
            module: module.to_string(),
            date_time: self.date_time,
            topic: self.topic,
            value: self.value,
        }
    }
}

impl From<&Data> for StoredRecord {
    fn from(d: &Data) -> Self {
        Self {
            topic: d.topic.clone(),
            date_time: d.date_time.clone(),
            value: d.value.clone(),
        }
    }
}

pub struct EmbeddedStorage {
    path: PathBuf,
    read_only: bool,
    db: Arc<RwLock<Option<Arc<Db>>>>,
    /// Modules whose column family exists; guards create/drop of families.
    namespaces: Arc<Mutex<BTreeSet<String>>>,
    activation: ActivationCache,
    shutdown: Shutdown,
}

impl EmbeddedStorage {
    /// Opens (or creates, unless `read_only`) the store at `path`.
    ///
    /// The handle is closed once `shutdown` fires.
    pub async fn open<P: AsRef<Path>>(
        path: P,
        read_only: bool,
        shutdown: Shutdown,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let (db, modules) =
            tokio::task::spawn_blocking(move || Self::open_db(&open_path, read_only)).await??;
        info!(
            "embedded store opened at {} ({} modules{})",
            path.display(),
            modules.len(),
            if read_only { ", read-only" } else { "" }
        );

        let storage = Self {
            path,
            read_only,
            db: Arc::new(RwLock::new(Some(Arc::new(db)))),
            namespaces: Arc::new(Mutex::new(modules)),
            activation: ActivationCache::new(),
            shutdown,
        };

        let slot = storage.db.clone();
        let path = storage.path.clone();
        storage
            .shutdown
            .on_trigger(move || async move { Self::release(&slot, &path) });

        Ok(storage)
    }

    /// Options applied to every column family, module or default.
    fn family_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(DBCompressionType::Snappy);
        opts
    }

    fn open_db(path: &Path, read_only: bool) -> Result<(Db, BTreeSet<String>), StorageError> {
        let unavailable =
            |e: &dyn std::fmt::Display| StorageError::BackendUnavailable(format!("{}: {}", path.display(), e));

        let mut opts = Options::default();
        opts.create_if_missing(!read_only);
        opts.create_missing_column_families(!read_only);
        opts.set_compression_type(DBCompressionType::Snappy);

        if !read_only {
            std::fs::create_dir_all(path).map_err(|e| unavailable(&e))?;
        }

        let families = Db::list_cf(&opts, path)
            .unwrap_or_else(|_| vec![DEFAULT_COLUMN_FAMILY_NAME.to_string()]);
        let descriptors: Vec<ColumnFamilyDescriptor> = families
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Self::family_options()))
            .collect();

        let db = if read_only {
            Db::open_cf_descriptors_read_only(&opts, path, descriptors, false)
        } else {
            Db::open_cf_descriptors(&opts, path, descriptors)
        }
        .map_err(|e| unavailable(&e))?;

        let modules = families
            .iter()
            .filter_map(|name| name.strip_prefix(NAMESPACE_PREFIX))
            .map(str::to_string)
            .collect();
        Ok((db, modules))
    }

    fn release(slot: &RwLock<Option<Arc<Db>>>, path: &Path) {
        if slot.write().take().is_some() {
            info!("embedded store at {} closed", path.display());
        }
    }

    /// Closes the handle. Later calls fail with `BackendUnavailable`.
    pub fn close(&self) {
        Self::release(&self.db, &self.path);
    }

    /// Modules that currently have a namespace.
    pub fn modules(&self) -> Vec<String> {
        self.namespaces.lock().iter().cloned().collect()
    }

    fn handle(&self) -> Result<Arc<Db>, StorageError> {
        self.db
            .read()
            .clone()
            .ok_or_else(|| StorageError::BackendUnavailable("embedded store is closed".into()))
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::BackendUnavailable(format!(
                "{} is opened read-only",
                self.path.display()
            )));
        }
        Ok(())
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Db) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.handle()?;
        self.shutdown
            .guard(async move { tokio::task::spawn_blocking(move || op(&db)).await? })
            .await
    }

    /// Idempotent "create if absent" for a module's column family.
    fn create_namespace(
        db: &Db,
        namespaces: &Mutex<BTreeSet<String>>,
        module: &str,
    ) -> Result<(), StorageError> {
        let cf = namespace(module);
        let mut known = namespaces.lock();
        if db.cf_handle(&cf).is_none() {
            db.create_cf(&cf, &Self::family_options())?;
            debug!("embedded namespace created: {}", module);
        }
        known.insert(module.to_string());
        Ok(())
    }

    /// Drops every module namespace. Used by tests and migrations.
    pub async fn clean_up(&self) -> Result<(), StorageError> {
        self.check_writable()?;
        let namespaces = self.namespaces.clone();
        self.run_blocking(move |db| {
            let mut known = namespaces.lock();
            for module in known.iter() {
                let cf = namespace(module);
                if db.cf_handle(&cf).is_some() {
                    db.drop_cf(&cf)?;
                }
            }
            known.clear();
            Ok(())
        })
        .await?;
        self.activation.clear();
        info!("embedded store at {} cleaned up", self.path.display());
        Ok(())
    }

    /// Drops one module's namespace and forgets its activation.
    pub async fn drop_module(&self, module: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        let module = ModuleName::parse(module)?;
        let namespaces = self.namespaces.clone();
        let name = module.to_string();
        self.run_blocking(move |db| {
            let mut known = namespaces.lock();
            let cf = namespace(&name);
            if db.cf_handle(&cf).is_some() {
                db.drop_cf(&cf)?;
            }
            known.remove(&name);
            Ok(())
        })
        .await?;
        self.activation.deactivate(&module);
        Ok(())
    }
}

#[async_trait]
impl Storer for EmbeddedStorage {
    async fn read(&self, module: &str) -> Result<Vec<Data>, StorageError> {
        let module = ModuleName::parse(module)?;
        let name = module.to_string();
        let records = self
            .run_blocking(move |db| {
                let cf = db
                    .cf_handle(&namespace(&name))
                    .ok_or_else(|| StorageError::NotFound(name.clone()))?;
                let mut out = Vec::new();
                for item in db.iterator_cf(&cf, IteratorMode::Start) {
                    let (_, value) = item?;
                    let record: StoredRecord = serde_json::from_slice(&value)?;
                    out.push(record.into_data(&name));
                }
                Ok(out)
            })
            .await?;
        debug!("embedded read from [{}]: {} records", module, records.len());
        Ok(records)
    }

    async fn write(&self, data: Data) -> Result<(), StorageError> {
        let module = data.validate()?;
        self.check_writable()?;
        let data = data.with_default_timestamp();

        let namespaces = self.namespaces.clone();
        let name = module.to_string();
        self.activation
            .ensure_active(&module, || {
                let namespaces = namespaces.clone();
                let name = name.clone();
                self.run_blocking(move |db| Self::create_namespace(db, &namespaces, &name))
            })
            .await?;

        let key = data.key();
        let payload = serde_json::to_vec(&StoredRecord::from(&data))?;
        let put_key = key.clone();
        self.run_blocking(move |db| {
            let cf_name = namespace(&name);
            // the family may have been dropped since activation
            if db.cf_handle(&cf_name).is_none() {
                Self::create_namespace(db, &namespaces, &name)?;
            }
            let cf = db
                .cf_handle(&cf_name)
                .ok_or_else(|| StorageError::NotFound(name.clone()))?;
            db.put_cf(&cf, put_key.as_bytes(), payload)?;
            Ok(())
        })
        .await?;

        debug!("embedded saved to [{}]: key: {}, v: {}", module, key, data.value);
        Ok(())
    }

    async fn view(&self, module: &str) -> Result<View, StorageError> {
        Ok(pivot(self.read(module).await?))
    }
}
