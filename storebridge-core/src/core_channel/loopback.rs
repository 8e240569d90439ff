/*
    LoopbackChannel - in-process reference transport

    Connects one client to a `ServerChannel` through a pair of byte queues.
    Every frame is an `RpcMessage` serialized with serde_json, so the two sides
    share no objects, only bytes.

    Workflow:

    1. `call(command, arg)`:
        - allocate a request id, park a oneshot in the pending map
        - push a `request` frame to the owner side
        - await the matching `response`
    2. Owner-side connection task:
        - handles frames strictly one after another, awaiting each command
          before reading the next frame (ordered per-connection delivery)
        - `listen` opens a server-side EventStream and spawns a forwarder that
          turns each payload into an `event` frame
        - `dispose` drops that stream
    3. Client-side reader task:
        - routes `response` frames to pending calls
        - routes `event` frames to local listeners by subscription id

    Calls have no timeout: a command that never completes blocks its caller
    and every later frame of the same connection.
*/

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::errors::{ChannelError, ChannelResult, RpcError};
use super::rpc_protocol::RpcMessage;
use super::{Channel, EventStream, ServerChannel};
use crate::core_events::SubscriptionHandle;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>>>;
type ListenerMap = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Value>>>>;

/// Client end of an in-process connection
pub struct LoopbackChannel {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    next_id: AtomicU64,
    pending: PendingMap,
    listeners: ListenerMap,
    tasks: Vec<JoinHandle<()>>,
}

impl LoopbackChannel {
    /// Open a new connection to `server` and spawn both connection tasks
    pub fn connect(server: Arc<dyn ServerChannel>) -> Self {
        let (client_tx, client_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (server_tx, server_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let listeners: ListenerMap = Arc::new(Mutex::new(HashMap::new()));

        let owner_task = tokio::spawn(serve_connection(server, client_rx, server_tx));
        let reader_task = tokio::spawn(read_frames(
            server_rx,
            Arc::clone(&pending),
            Arc::clone(&listeners),
        ));

        Self {
            outbound: client_tx,
            next_id: AtomicU64::new(1),
            pending,
            listeners,
            tasks: vec![owner_task, reader_task],
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, message: &RpcMessage) -> ChannelResult<()> {
        let bytes = message.to_bytes()?;
        self.outbound
            .send(bytes)
            .map_err(|_| ChannelError::Disconnected("owner side closed".to_string()))
    }

    /// Send a frame and wait for the response carrying the same id
    async fn round_trip(&self, id: u64, message: RpcMessage) -> ChannelResult<Value> {
        let (response_tx, response_rx) = oneshot::channel();
        lock(&self.pending).insert(id, response_tx);

        if let Err(e) = self.send(&message) {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        response_rx
            .await
            .map_err(|_| ChannelError::Disconnected("response channel closed".to_string()))?
            .map_err(ChannelError::from)
    }

    /// Number of calls still waiting for a response
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Number of open subscriptions on this connection
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl Channel for LoopbackChannel {
    async fn call(&self, command: &str, arg: Value) -> ChannelResult<Value> {
        let id = self.next_id();
        let message = RpcMessage::Request {
            id,
            command: command.to_string(),
            arg,
        };
        self.round_trip(id, message).await
    }

    async fn listen(&self, event: &str) -> ChannelResult<EventStream> {
        let id = self.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).insert(id, tx);

        let message = RpcMessage::Listen {
            id,
            event: event.to_string(),
        };
        if let Err(e) = self.round_trip(id, message).await {
            lock(&self.listeners).remove(&id);
            return Err(e);
        }

        let listeners = Arc::clone(&self.listeners);
        let outbound = self.outbound.clone();
        let handle = SubscriptionHandle::new(id, move || {
            lock(&listeners).remove(&id);
            if let Ok(bytes) = (RpcMessage::Dispose { id }).to_bytes() {
                // The owner side may already be gone; nothing left to release then.
                let _ = outbound.send(bytes);
            }
        });

        Ok(EventStream::new(handle, rx))
    }
}

/// Owner side of one connection
async fn serve_connection(
    server: Arc<dyn ServerChannel>,
    mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
) {
    let mut subscriptions: HashMap<u64, (SubscriptionHandle, JoinHandle<()>)> = HashMap::new();

    while let Some(bytes) = inbound.recv().await {
        let message = match RpcMessage::from_bytes(&bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                continue;
            }
        };

        match message {
            RpcMessage::Request { id, command, arg } => {
                let result = server.call(&command, arg).await.map_err(RpcError::from);
                reply(&outbound, RpcMessage::Response { id, result });
            }
            RpcMessage::Listen { id, event } => match server.listen(&event) {
                Ok(stream) => {
                    let EventStream {
                        handle,
                        mut receiver,
                    } = stream;
                    let events_out = outbound.clone();
                    let forwarder = tokio::spawn(async move {
                        while let Some(payload) = receiver.recv().await {
                            reply(&events_out, RpcMessage::Event { id, payload });
                        }
                    });
                    subscriptions.insert(id, (handle, forwarder));
                    reply(
                        &outbound,
                        RpcMessage::Response {
                            id,
                            result: Ok(Value::Null),
                        },
                    );
                }
                Err(e) => reply(
                    &outbound,
                    RpcMessage::Response {
                        id,
                        result: Err(e.into()),
                    },
                ),
            },
            RpcMessage::Dispose { id } => {
                if let Some((handle, forwarder)) = subscriptions.remove(&id) {
                    handle.unsubscribe();
                    forwarder.abort();
                }
            }
            RpcMessage::Response { id, .. } | RpcMessage::Event { id, .. } => {
                warn!("Ignoring owner-bound frame {} of the wrong direction", id);
            }
        }
    }

    debug!("Connection closed, releasing {} subscriptions", subscriptions.len());
    for (_, (handle, forwarder)) in subscriptions {
        handle.unsubscribe();
        forwarder.abort();
    }
}

/// Client side of one connection
async fn read_frames(
    mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: PendingMap,
    listeners: ListenerMap,
) {
    while let Some(bytes) = inbound.recv().await {
        match RpcMessage::from_bytes(&bytes) {
            Ok(RpcMessage::Response { id, result }) => {
                if let Some(response_tx) = lock(&pending).remove(&id) {
                    let _ = response_tx.send(result);
                }
            }
            Ok(RpcMessage::Event { id, payload }) => {
                // Events racing a dispose have no listener left; drop them.
                if let Some(tx) = lock(&listeners).get(&id) {
                    let _ = tx.send(payload);
                }
            }
            Ok(_) => warn!("Ignoring client-bound frame of the wrong direction"),
            Err(e) => warn!("Dropping undecodable frame: {}", e),
        }
    }

    // Owner side is gone: fail everything still waiting.
    lock(&pending).clear();
    lock(&listeners).clear();
}

fn reply(outbound: &mpsc::UnboundedSender<Vec<u8>>, message: RpcMessage) {
    match message.to_bytes() {
        Ok(bytes) => {
            let _ = outbound.send(bytes);
        }
        Err(e) => warn!("Failed to serialize frame: {}", e),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
