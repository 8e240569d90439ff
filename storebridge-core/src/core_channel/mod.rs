/*
    core_channel - Remote call/event surface

    The bridge only depends on two small traits:

    - `ServerChannel` is implemented by the owner side. Commands are looked up
      by name, arguments and results are plain JSON values, and named events are
      handed out as `EventStream`s.
    - `Channel` is what a client holds. The proxy talks to it exactly like it
      would to a local store, just asynchronously.

    The actual transport is an external collaborator. `LoopbackChannel` is an
    in-process reference transport that serializes every frame to bytes, so
    nothing but plain data crosses from one side to the other.
*/

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core_events::SubscriptionHandle;

mod errors;
pub mod loopback;
pub mod rpc_protocol;

pub use errors::{ChannelError, ChannelResult, RpcError};
pub use loopback::LoopbackChannel;
pub use rpc_protocol::RpcMessage;

/// A live subscription to a named event
#[derive(Debug)]
pub struct EventStream {
    pub handle: SubscriptionHandle,
    pub receiver: mpsc::UnboundedReceiver<Value>,
}

impl EventStream {
    pub fn new(handle: SubscriptionHandle, receiver: mpsc::UnboundedReceiver<Value>) -> Self {
        Self { handle, receiver }
    }

    /// Next payload, or `None` once the subscription is closed
    pub async fn next(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }
}

/// Owner-side dispatch surface
#[async_trait]
pub trait ServerChannel: Send + Sync {
    async fn call(&self, command: &str, arg: Value) -> ChannelResult<Value>;

    fn listen(&self, event: &str) -> ChannelResult<EventStream>;
}

/// Client-side view of a remote `ServerChannel`
#[async_trait]
pub trait Channel: Send + Sync {
    async fn call(&self, command: &str, arg: Value) -> ChannelResult<Value>;

    async fn listen(&self, event: &str) -> ChannelResult<EventStream>;
}
