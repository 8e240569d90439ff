/*
    StorageGateway - owner-side authority over storage

    Workflow:

    1. The first operation (or an explicit `initialize()`) moves the gateway
       from Uninitialized to Initializing and spawns the initialization task:
        - open storage; a failure is logged and swallowed
        - seed the identity keys
        - subscribe to raw storage changes through the debouncer
       then the state becomes Ready and the latch opens.
    2. Every operation awaits the latch first, so calls made while still
       initializing simply queue behind it.
    3. Each debounce flush collapses the raw events to distinct keys, re-reads
       those keys from storage and emits one change payload. A key that no
       longer exists is published with a `null` value.
    4. If raw events were lost while a window was open, the flush resyncs:
       every key currently in storage is published, and every key known from
       earlier that has since disappeared is published as `null`.

    Initialization has no timeout. If the storage never finishes opening,
    every caller waits forever.
*/

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::identity::seed_identity;
use super::ready::ReadyLatch;
use crate::config::GatewayConfig;
use crate::core_codec::{encode, ChangeEventPayload, Item, UpdateItemsPayload};
use crate::core_debounce::{spawn_debounced, Batch};
use crate::core_events::{EventEmitter, SubscriptionHandle};
use crate::core_storage::{StorageBackend, StorageChangeEvent, StorageResult};
use crate::metrics::{self, GATEWAY_CHANGES_EMITTED, GATEWAY_FLUSHES};

/// Initialization state. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Uninitialized,
    Initializing,
    Ready,
}

struct GatewayInner {
    storage: Arc<dyn StorageBackend>,
    config: GatewayConfig,
    state: Mutex<GatewayState>,
    ready: ReadyLatch,
    changes: EventEmitter<Value>,
    debounce_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for GatewayInner {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.debounce_task).take() {
            task.abort();
        }
    }
}

/// Cloneable handle to one gateway
#[derive(Clone)]
pub struct StorageGateway {
    inner: Arc<GatewayInner>,
}

impl StorageGateway {
    pub fn new(storage: Arc<dyn StorageBackend>, config: GatewayConfig) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                storage,
                config,
                state: Mutex::new(GatewayState::Uninitialized),
                ready: ReadyLatch::new(),
                changes: EventEmitter::new(),
                debounce_task: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> GatewayState {
        *lock(&self.inner.state)
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.is_open()
    }

    /// Start initialization if nobody has yet, then wait until Ready.
    ///
    /// The work runs on its own task, so dropping this future does not abandon it.
    pub async fn initialize(&self) {
        let start = {
            let mut state = lock(&self.inner.state);
            if *state == GatewayState::Uninitialized {
                *state = GatewayState::Initializing;
                true
            } else {
                false
            }
        };

        if start {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_initialization().await });
        }

        self.inner.ready.wait().await;
    }

    /// Every key/value pair currently in storage
    pub async fn get_items(&self) -> Vec<Item> {
        self.initialize().await;
        encode(&self.inner.storage.items())
    }

    /// Apply inserts, then deletions, so a key in both ends up deleted
    pub async fn update_items(&self, request: UpdateItemsPayload) -> StorageResult<()> {
        self.initialize().await;

        let storage = &self.inner.storage;
        if let Some(insert) = request.insert {
            for Item(key, value) in insert {
                storage.store(&key, &value).await?;
            }
        }
        if let Some(delete) = request.delete {
            for key in delete {
                storage.remove(&key).await?;
            }
        }
        Ok(())
    }

    /// Storage engine's integrity report, relayed verbatim
    pub async fn check_integrity(&self, full: bool) -> StorageResult<String> {
        self.initialize().await;
        self.inner.storage.check_integrity(full).await
    }

    /// Subscribe to serialized change payloads (`{ "items": [...] }`)
    pub fn on_did_change_items(&self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<Value>) {
        self.inner.changes.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.changes.subscriber_count()
    }

    /// Stop publishing change events
    pub fn shutdown(&self) {
        if let Some(task) = lock(&self.inner.debounce_task).take() {
            info!("Stopping change publication");
            task.abort();
        }
    }
}

impl GatewayInner {
    async fn run_initialization(self: Arc<Self>) {
        info!("Initializing storage gateway");

        if let Err(e) = self.storage.initialize().await {
            error!("Storage initialization failed, serving defaults: {}", e);
        }

        if self.config.seed_identity {
            if let Err(e) = seed_identity(self.storage.as_ref()).await {
                error!("Failed to seed identity values: {}", e);
            }
        }

        let storage = Arc::clone(&self.storage);
        let changes = self.changes.clone();
        let raw_changes = self.storage.subscribe_changes();
        let mut known = KnownKeys::from_storage(self.storage.as_ref());
        let task = spawn_debounced(raw_changes, self.config.debounce_delay, move |batch| {
            publish_changes(storage.as_ref(), &changes, batch, &mut known);
        });
        *lock(&self.debounce_task) = Some(task);

        *lock(&self.state) = GatewayState::Ready;
        self.ready.open();
        info!("Storage gateway ready");
    }
}

/// Keys the gateway has seen present in storage, used to find deletions that
/// happened while raw events were being dropped
#[derive(Debug, Default)]
pub(crate) struct KnownKeys(HashSet<String>);

impl KnownKeys {
    pub(crate) fn from_storage(storage: &dyn StorageBackend) -> Self {
        Self(storage.items().into_keys().collect())
    }

    fn record(&mut self, items: &HashMap<String, Option<String>>) {
        for (key, value) in items {
            if value.is_some() {
                self.0.insert(key.clone());
            } else {
                self.0.remove(key);
            }
        }
    }
}

/// Resolve a flushed batch to current values and emit it.
/// Returns the number of distinct keys published.
pub(crate) fn publish_changes(
    storage: &dyn StorageBackend,
    changes: &EventEmitter<Value>,
    batch: Batch<StorageChangeEvent>,
    known: &mut KnownKeys,
) -> usize {
    metrics::record_counter(GATEWAY_FLUSHES, 1);

    let mut keys: HashSet<String> = batch.events.into_iter().map(|event| event.key).collect();
    if batch.lagged {
        warn!("Raw changes were dropped, republishing the whole store");
        let current = storage.items();
        keys.extend(known.0.iter().cloned());
        keys.extend(current.into_keys());
    }

    let items: HashMap<String, Option<String>> = keys
        .into_iter()
        .map(|key| {
            let value = storage.get(&key);
            (key, value)
        })
        .collect();
    known.record(&items);

    if items.is_empty() {
        return 0;
    }

    let payload = ChangeEventPayload {
        items: encode(&items),
    };
    match serde_json::to_value(&payload) {
        Ok(value) => {
            let delivered = changes.emit(&value);
            debug!(
                "Published {} changed keys to {} subscribers",
                items.len(),
                delivered
            );
            metrics::record_counter(GATEWAY_CHANGES_EMITTED, items.len() as u64);
        }
        Err(e) => warn!("Failed to serialize change event: {}", e),
    }

    items.len()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
