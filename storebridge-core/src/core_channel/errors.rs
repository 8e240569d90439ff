/*
    errors.rs - Error types for the call/event surface

    `ChannelError` is what callers on either side see. `RpcError` is its wire
    form: a numeric code plus the detail string, so a failure raised on the
    owner side arrives as the same `ChannelError` variant on the client side.
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes for RPC errors
pub const ERR_INVALID_PARAMS: i32 = -32602;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INTERNAL_ERROR: i32 = -32603;
pub const ERR_STORAGE: i32 = -32001;
pub const ERR_EVENT_NOT_FOUND: i32 = -32004;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The remote side has no command with this name
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The remote side has no event with this name
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// A request or response did not match its schema
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The storage collaborator rejected the operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// The connection is gone
    #[error("Channel disconnected: {0}")]
    Disconnected(String),

    /// A frame could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        ChannelError::Serialization(err.to_string())
    }
}

impl From<crate::core_codec::CodecError> for ChannelError {
    fn from(err: crate::core_codec::CodecError) -> Self {
        ChannelError::InvalidPayload(err.to_string())
    }
}

impl From<crate::core_storage::StorageError> for ChannelError {
    fn from(err: crate::core_storage::StorageError) -> Self {
        ChannelError::Storage(err.to_string())
    }
}

/// Wire representation of a failed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: String) -> Self {
        RpcError { code, message }
    }
}

impl From<ChannelError> for RpcError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::UnknownCommand(m) => RpcError::new(ERR_METHOD_NOT_FOUND, m),
            ChannelError::UnknownEvent(m) => RpcError::new(ERR_EVENT_NOT_FOUND, m),
            ChannelError::InvalidPayload(m) => RpcError::new(ERR_INVALID_PARAMS, m),
            ChannelError::Storage(m) => RpcError::new(ERR_STORAGE, m),
            ChannelError::Disconnected(m) | ChannelError::Serialization(m) => {
                RpcError::new(ERR_INTERNAL_ERROR, m)
            }
        }
    }
}

impl From<RpcError> for ChannelError {
    fn from(err: RpcError) -> Self {
        match err.code {
            ERR_METHOD_NOT_FOUND => ChannelError::UnknownCommand(err.message),
            ERR_EVENT_NOT_FOUND => ChannelError::UnknownEvent(err.message),
            ERR_INVALID_PARAMS => ChannelError::InvalidPayload(err.message),
            ERR_STORAGE => ChannelError::Storage(err.message),
            _ => ChannelError::Serialization(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_survives_wire_mapping() {
        for err in [
            ChannelError::UnknownCommand("dropItems".to_string()),
            ChannelError::UnknownEvent("onDidExplode".to_string()),
            ChannelError::InvalidPayload("not an object".to_string()),
            ChannelError::Storage("disk full".to_string()),
        ] {
            let wire: RpcError = err.clone().into();
            let json = serde_json::to_string(&wire).unwrap();
            let back: RpcError = serde_json::from_str(&json).unwrap();
            assert_eq!(ChannelError::from(back), err);
        }
    }

    #[test]
    fn test_unknown_command_code() {
        let wire = RpcError::from(ChannelError::UnknownCommand("x".to_string()));
        assert_eq!(wire.code, -32601);
        assert_eq!(wire.message, "x");
    }
}
