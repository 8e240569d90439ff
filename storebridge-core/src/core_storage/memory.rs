/*
    memory.rs - In-memory storage collaborator

    Reference `StorageBackend` for tests and the demo binary. "Persisted" items
    handed to `with_items` are only loaded by `initialize`, so a failed
    initialization leaves an empty store, the way a database that cannot be
    opened would.
*/

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use tokio::sync::{broadcast, oneshot};
use tracing::trace;

use super::{StorageBackend, StorageChangeEvent, StorageError, StorageResult};

const DEFAULT_CHANGE_CAPACITY: usize = 1024;

pub struct InMemoryStorage {
    items: RwLock<HashMap<String, String>>,
    persisted: Mutex<Option<HashMap<String, String>>>,
    changes: broadcast::Sender<StorageChangeEvent>,
    initialized: AtomicBool,
    init_failure: Option<String>,
    init_barrier: Mutex<Option<oneshot::Receiver<()>>>,
    integrity_report: Option<String>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::with_change_capacity(DEFAULT_CHANGE_CAPACITY)
    }

    pub fn with_change_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            items: RwLock::new(HashMap::new()),
            persisted: Mutex::new(None),
            changes,
            initialized: AtomicBool::new(false),
            init_failure: None,
            init_barrier: Mutex::new(None),
            integrity_report: None,
        }
    }

    /// Items that `initialize` loads, as if read back from disk
    pub fn with_items<K, V>(self, items: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let items = items
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        *lock(&self.persisted) = Some(items);
        self
    }

    /// Make `initialize` fail with `message`
    pub fn with_init_failure(mut self, message: impl Into<String>) -> Self {
        self.init_failure = Some(message.into());
        self
    }

    /// Make `initialize` wait until the paired sender fires (or is dropped)
    pub fn with_init_barrier(self, barrier: oneshot::Receiver<()>) -> Self {
        *lock(&self.init_barrier) = Some(barrier);
        self
    }

    /// Report returned by `check_integrity` instead of the default
    pub fn with_integrity_report(mut self, report: impl Into<String>) -> Self {
        self.integrity_report = Some(report.into());
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        read(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, key: &str) {
        trace!("storage key changed: {}", key);
        // No receivers yet is fine: nobody is listening.
        let _ = self.changes.send(StorageChangeEvent::new(key));
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn initialize(&self) -> StorageResult<()> {
        let barrier = lock(&self.init_barrier).take();
        if let Some(barrier) = barrier {
            let _ = barrier.await;
        }

        if let Some(message) = &self.init_failure {
            return Err(StorageError::Initialization(message.clone()));
        }

        if !self.initialized.swap(true, Ordering::AcqRel) {
            let persisted = lock(&self.persisted).take();
            if let Some(persisted) = persisted {
                // Loading is not a mutation; no change events.
                let mut items = write(&self.items);
                for (key, value) in persisted {
                    items.entry(key).or_insert(value);
                }
            }
        }

        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        read(&self.items).get(key).cloned()
    }

    fn items(&self) -> HashMap<String, String> {
        read(&self.items).clone()
    }

    async fn store(&self, key: &str, value: &str) -> StorageResult<()> {
        let changed = {
            let mut items = write(&self.items);
            match items.get(key) {
                Some(existing) if existing == value => false,
                _ => {
                    items.insert(key.to_string(), value.to_string());
                    true
                }
            }
        };

        if changed {
            self.notify(key);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let removed = write(&self.items).remove(key).is_some();
        if removed {
            self.notify(key);
        }
        Ok(())
    }

    async fn check_integrity(&self, full: bool) -> StorageResult<String> {
        if let Some(report) = &self.integrity_report {
            return Ok(report.clone());
        }

        Ok(if full {
            format!("ok ({} items checked)", self.len())
        } else {
            "ok".to_string()
        })
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StorageChangeEvent> {
        self.changes.subscribe()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_get_remove() {
        let storage = InMemoryStorage::new();
        storage.initialize().await.unwrap();

        storage.store("k", "v").await.unwrap();
        assert_eq!(storage.get("k"), Some("v".to_string()));
        assert_eq!(storage.get_or("missing", "fallback"), "fallback");

        storage.remove("k").await.unwrap();
        assert_eq!(storage.get("k"), None);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_change_events_only_for_effective_mutations() {
        let storage = InMemoryStorage::new();
        let mut changes = storage.subscribe_changes();

        storage.store("a", "1").await.unwrap();
        storage.store("a", "1").await.unwrap();
        storage.remove("missing").await.unwrap();
        storage.store("a", "2").await.unwrap();
        storage.remove("a").await.unwrap();

        let keys: Vec<String> = std::iter::from_fn(|| changes.try_recv().ok())
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["a", "a", "a"]);
    }

    #[tokio::test]
    async fn test_initialize_loads_persisted_items_once() {
        let storage = InMemoryStorage::new().with_items([("a", "1")]);
        assert!(storage.is_empty());

        storage.initialize().await.unwrap();
        assert_eq!(storage.get("a"), Some("1".to_string()));

        storage.store("a", "2").await.unwrap();
        storage.initialize().await.unwrap();
        assert_eq!(storage.get("a"), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_failed_initialize_leaves_store_empty() {
        let storage = InMemoryStorage::new()
            .with_items([("a", "1")])
            .with_init_failure("database is locked");

        let err = storage.initialize().await.unwrap_err();
        assert!(err.to_string().contains("database is locked"));
        assert!(!storage.is_initialized());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_init_barrier_holds_initialize() {
        let (release, barrier) = oneshot::channel();
        let storage = std::sync::Arc::new(InMemoryStorage::new().with_init_barrier(barrier));

        let init = tokio::spawn({
            let storage = storage.clone();
            async move { storage.initialize().await }
        });
        tokio::task::yield_now().await;
        assert!(!storage.is_initialized());

        release.send(()).unwrap();
        init.await.unwrap().unwrap();
        assert!(storage.is_initialized());
    }

    #[tokio::test]
    async fn test_integrity_report() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.check_integrity(false).await.unwrap(), "ok");
        assert_eq!(
            storage.check_integrity(true).await.unwrap(),
            "ok (0 items checked)"
        );

        let storage = InMemoryStorage::new().with_integrity_report("row 3 missing from index");
        assert_eq!(
            storage.check_integrity(true).await.unwrap(),
            "row 3 missing from index"
        );
    }
}
