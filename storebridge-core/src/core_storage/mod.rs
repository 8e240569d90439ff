/*
    core_storage - Storage collaborator interface

    The gateway owns exactly one `StorageBackend`. The engine behind it is
    external; this module fixes the operations the gateway relies on and the
    raw change signal it listens to.

    Raw change events only say *which* key changed. The gateway re-reads the
    value when it publishes, so the event carries no value.
*/

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::broadcast;

mod errors;
mod memory;

pub use errors::{StorageError, StorageResult};
pub use memory::InMemoryStorage;

/// "This key changed" notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChangeEvent {
    pub key: String,
}

impl StorageChangeEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Open the underlying database
    async fn initialize(&self) -> StorageResult<()>;

    fn get(&self, key: &str) -> Option<String>;

    fn get_or(&self, key: &str, fallback: &str) -> String {
        self.get(key).unwrap_or_else(|| fallback.to_string())
    }

    /// Every key/value pair currently stored
    fn items(&self) -> HashMap<String, String>;

    async fn store(&self, key: &str, value: &str) -> StorageResult<()>;

    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Diagnostic report of the engine's own integrity check
    async fn check_integrity(&self, full: bool) -> StorageResult<String>;

    /// One event per mutated key, in mutation order
    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChangeEvent>;
}
