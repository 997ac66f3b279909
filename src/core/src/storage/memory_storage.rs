//! In-memory backend for tests and local experiments.
//!
//! Mirrors the embedded backend's semantics: one ordered map per module keyed
//! by `<topic>-<date_time>`, overwrite on repeated keys.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;

use crate::error_handling::types::StorageError;
use crate::storage::lifecycle::Shutdown;
use crate::storage::storage_trait::Storer;
use crate::storage::types::{Data, ModuleName, View};
use crate::storage::view::pivot;

#[derive(Debug)]
pub struct MemoryStorage {
    modules: RwLock<HashMap<String, BTreeMap<String, Data>>>,
    closed: AtomicBool,
    shutdown: Shutdown,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(Shutdown::never())
    }
}

impl MemoryStorage {
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) || self.shutdown.is_triggered() {
            return Err(StorageError::BackendUnavailable(
                "memory store is closed".into(),
            ));
        }
        Ok(())
    }

    pub fn modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clean_up(&self) {
        self.modules.write().clear();
    }
}

#[async_trait]
impl Storer for MemoryStorage {
    async fn read(&self, module: &str) -> Result<Vec<Data>, StorageError> {
        let module = ModuleName::parse(module)?;
        self.check_open()?;
        self.modules
            .read()
            .get(module.as_str())
            .map(|records| records.values().cloned().collect())
            .ok_or_else(|| StorageError::NotFound(module.to_string()))
    }

    async fn write(&self, data: Data) -> Result<(), StorageError> {
        data.validate()?;
        self.check_open()?;
        let data = data.with_default_timestamp();
        debug!("memory saved to [{}]: key: {}", data.module, data.key());
        self.modules
            .write()
            .entry(data.module.clone())
            .or_default()
            .insert(data.key(), data);
        Ok(())
    }

    async fn view(&self, module: &str) -> Result<View, StorageError> {
        Ok(pivot(self.read(module).await?))
    }
}
