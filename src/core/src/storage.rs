//! Storage subsystem
//!
//! This module provides the telemetry sample store and its interchangeable
//! backends.
//!
//! Components:
//! - `storage_trait`: the `Storer` trait defining a uniform Read/Write/View API.
//! - `types`: `Data`, `Message`, `ModuleName` and the `View` shape.
//! - `embedded_storage`: ordered key-value implementation on RocksDB, one column family per module.
//! - `database_storage`: SQLite implementation through sqlx, one table per module.
//! - `memory_storage`: in-process implementation for tests and local runs.
//! - `activation`: per-backend cache of modules whose namespace exists.
//! - `view`: the `Topic -> DateTime -> Value` pivot shared by every backend.
//! - `lifecycle`: the shutdown signal each backend races against.
//! - `loader`: builds the configured backend.
//! - `migrate`: copies modules from one backend to another.

pub mod activation;
pub mod database_storage;
pub mod embedded_storage;
pub mod lifecycle;
pub mod loader;
pub mod memory_storage;
pub mod migrate;
pub mod storage_trait;
pub mod types;
pub mod view;

#[cfg(test)]
mod tests;

pub use loader::{load, Backend, StorageKind};
pub use storage_trait::Storer;
pub use types::{Data, Message, ModuleName, View};
