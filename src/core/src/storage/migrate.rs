use log::{info, warn};

use crate::error_handling::types::StorageError;
use crate::storage::lifecycle::Shutdown;
use crate::storage::storage_trait::Storer;

const PROGRESS_EVERY: usize = 1000;

/// Copies every record of `modules` from `source` into `target`.
///
/// Records are copied through `Read`, so values keep their textual form.
/// Returns the number of records written. Stops with `Cancelled` when
/// `shutdown` fires between two records; already copied records stay.
pub async fn migrate(
    source: &dyn Storer,
    target: &dyn Storer,
    modules: &[String],
    shutdown: &Shutdown,
) -> Result<usize, StorageError> {
    let mut copied = 0usize;
    for module in modules {
        let records = source.read(module).await?;
        info!("migrating {} records of module {}", records.len(), module);
        for record in records {
            if shutdown.is_triggered() {
                warn!("migration interrupted after {} records", copied);
                return Err(StorageError::Cancelled);
            }
            target.write(record).await?;
            copied += 1;
            if copied % PROGRESS_EVERY == 0 {
                info!("migrated {} records", copied);
            }
        }
    }
    info!("migration done: {} records", copied);
    Ok(copied)
}
