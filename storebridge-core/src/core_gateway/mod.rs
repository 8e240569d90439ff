/*
    core_gateway - Owner side of the bridge

    `StorageGateway` holds storage authority; `GatewayChannel` exposes it under
    the remote command and event names below.
*/

mod channel;
mod gateway;
pub mod identity;
mod ready;

pub use channel::GatewayChannel;
pub use gateway::{GatewayState, StorageGateway};
pub use identity::{
    seed_identity, CURRENT_SESSION_DATE_KEY, FIRST_SESSION_DATE_KEY, INSTANCE_ID_KEY,
    LAST_SESSION_DATE_KEY,
};
pub use ready::ReadyLatch;

pub const GET_ITEMS: &str = "getItems";
pub const UPDATE_ITEMS: &str = "updateItems";
pub const CHECK_INTEGRITY: &str = "checkIntegrity";
pub const CHANGE_EVENT: &str = "onDidChangeItems";
