/*
    RpcProtocol - frames exchanged between a client and the owner

    Client -> owner:
        request  { id, command, arg }     invoke a command
        listen   { id, event }            subscribe, acknowledged by a response
        dispose  { id }                   drop the subscription opened by `listen`

    Owner -> client:
        response { id, result }           reply to request/listen
        event    { id, payload }          payload for the subscription `id`

    Message structure, using serde_json:
    ```json
    {
        "type": "request",
        "id": 7,
        "command": "updateItems",
        "arg": { "insert": [["color", "blue"]] }
    }
    ```
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{ChannelResult, RpcError};

/// RPC message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RpcMessage {
    #[serde(rename = "request")]
    Request {
        id: u64,
        command: String,
        arg: Value,
    },
    #[serde(rename = "listen")]
    Listen { id: u64, event: String },
    #[serde(rename = "dispose")]
    Dispose { id: u64 },
    #[serde(rename = "response")]
    Response {
        id: u64,
        result: Result<Value, RpcError>,
    },
    #[serde(rename = "event")]
    Event { id: u64, payload: Value },
}

impl RpcMessage {
    pub fn to_bytes(&self) -> ChannelResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> ChannelResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let msg = RpcMessage::Request {
            id: 7,
            command: "getItems".to_string(),
            arg: Value::Null,
        };
        let wire: Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!({ "type": "request", "id": 7, "command": "getItems", "arg": null })
        );
    }

    #[test]
    fn test_error_response_roundtrip() {
        let msg = RpcMessage::Response {
            id: 3,
            result: Err(RpcError::new(-32601, "nope".to_string())),
        };
        let back = RpcMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_garbage_frame_rejected() {
        assert!(RpcMessage::from_bytes(b"{\"type\":\"shout\"}").is_err());
        assert!(RpcMessage::from_bytes(b"not json").is_err());
    }
}
