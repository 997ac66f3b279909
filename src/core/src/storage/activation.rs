//! Per-backend record of which module namespaces are known to exist.
//!
//! The cache only saves a round-trip: correctness comes from the backend's
//! idempotent "create if absent" primitive, which may run more than once for
//! the same module when first writers race.

use std::collections::HashSet;
use std::future::Future;

use log::debug;
use parking_lot::RwLock;

use crate::error_handling::types::StorageError;
use crate::storage::types::ModuleName;

#[derive(Debug, Default)]
pub struct ActivationCache {
    active: RwLock<HashSet<String>>,
}

impl ActivationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, module: &ModuleName) -> bool {
        self.active.read().contains(module.as_str())
    }

    /// Makes sure `module`'s namespace exists.
    ///
    /// Returns `Ok(false)` on a cache hit and `Ok(true)` when `create` ran and
    /// succeeded. When `create` fails the module stays inactive so the next
    /// write retries.
    pub async fn ensure_active<F, Fut>(
        &self,
        module: &ModuleName,
        create: F,
    ) -> Result<bool, StorageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StorageError>>,
    {
        if self.is_active(module) {
            return Ok(false);
        }
        create().await?;
        self.active.write().insert(module.as_str().to_string());
        debug!("module {} activated", module);
        Ok(true)
    }

    pub fn deactivate(&self, module: &ModuleName) {
        self.active.write().remove(module.as_str());
    }

    pub fn clear(&self) {
        self.active.write().clear();
    }
}
