/*
    core_proxy - Client side of the bridge

    `StorageProxy` looks like a local store to its caller and forwards every
    operation over a `Channel`. It subscribes to the owner's change event once,
    when it is created, and republishes every well-formed payload to its own
    local listeners as a decoded `ItemsChangeEvent`.

    Architecture:

    ┌──────────────────────────┐          ┌──────────────────────────┐
    │      client process      │          │      owner process       │
    │                          │  calls   │                          │
    │  StorageProxy ───────────┼─────────►│  GatewayChannel          │
    │     ▲                    │          │     │                    │
    │     │ ItemsChangeEvent   │  events  │     ▼                    │
    │  local listeners ◄───────┼──────────┤  StorageGateway ─► store │
    └──────────────────────────┘          └──────────────────────────┘
*/

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ProxyConfig;
use crate::core_channel::{Channel, ChannelError, ChannelResult, EventStream};
use crate::core_codec::{decode_change_event, decode_snapshot, encode_update, ItemsChangeEvent, UpdateRequest};
use crate::core_events::{EventEmitter, SubscriptionHandle};
use crate::core_gateway::{CHECK_INTEGRITY, GET_ITEMS, UPDATE_ITEMS};
use crate::metrics::{self, PROXY_EVENTS_DROPPED, PROXY_UPDATES_SKIPPED};

struct ProxyShared {
    changes: EventEmitter<ItemsChangeEvent>,
    closed: AtomicBool,
}

impl ProxyShared {
    /// Validate one remote payload and fire it locally. Returns whether it was fired.
    fn dispatch(&self, payload: Value) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        match decode_change_event(payload) {
            Ok(event) => {
                self.changes.emit(&event);
                true
            }
            Err(e) => {
                debug!("Ignoring malformed change event: {}", e);
                metrics::record_counter(PROXY_EVENTS_DROPPED, 1);
                false
            }
        }
    }
}

/// Remote-backed store for a client process
pub struct StorageProxy {
    channel: Arc<dyn Channel>,
    shared: Arc<ProxyShared>,
    remote: SubscriptionHandle,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl StorageProxy {
    /// Connect with the default change event name
    pub async fn connect(channel: Arc<dyn Channel>) -> ChannelResult<Self> {
        Self::with_config(channel, &ProxyConfig::default()).await
    }

    pub async fn with_config(channel: Arc<dyn Channel>, config: &ProxyConfig) -> ChannelResult<Self> {
        let EventStream {
            handle: remote,
            mut receiver,
        } = channel.listen(&config.change_event).await?;

        let shared = Arc::new(ProxyShared {
            changes: EventEmitter::new(),
            closed: AtomicBool::new(false),
        });

        let forward = Arc::clone(&shared);
        let forwarder = tokio::spawn(async move {
            while let Some(payload) = receiver.recv().await {
                forward.dispatch(payload);
            }
        });

        debug!("Proxy subscribed to {}", config.change_event);

        Ok(Self {
            channel,
            shared,
            remote,
            forwarder: Mutex::new(Some(forwarder)),
        })
    }

    /// Full snapshot of the owner's storage
    pub async fn get_items(&self) -> ChannelResult<HashMap<String, String>> {
        let snapshot = self.channel.call(GET_ITEMS, Value::Null).await?;
        Ok(decode_snapshot(snapshot)?)
    }

    /// Send a write intent. Empty requests never leave the process.
    pub async fn update_items(&self, request: &UpdateRequest) -> ChannelResult<()> {
        if request.is_empty() {
            metrics::record_counter(PROXY_UPDATES_SKIPPED, 1);
            return Ok(());
        }

        let payload = serde_json::to_value(encode_update(request))?;
        self.channel.call(UPDATE_ITEMS, payload).await?;
        Ok(())
    }

    pub async fn check_integrity(&self, full: bool) -> ChannelResult<String> {
        match self.channel.call(CHECK_INTEGRITY, Value::Bool(full)).await? {
            Value::String(report) => Ok(report),
            other => Err(ChannelError::InvalidPayload(format!(
                "integrity report is not a string: {}",
                other
            ))),
        }
    }

    /// Listen for changes made by any client of the same owner
    pub fn on_did_change_items(
        &self,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<ItemsChangeEvent>) {
        self.shared.changes.subscribe()
    }

    /// Entry point for a raw remote change payload.
    /// Malformed payloads are dropped without surfacing an error.
    pub fn handle_remote_change(&self, payload: Value) -> bool {
        self.shared.dispatch(payload)
    }

    /// Stop receiving remote changes. Makes no remote call; safe to repeat.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            info!("Closing storage proxy");
        }
        self.release();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn release(&self) {
        self.remote.unsubscribe();
        let forwarder = self
            .forwarder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
    }
}

impl Drop for StorageProxy {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.release();
    }
}
