use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{StorageGateway, CHANGE_EVENT, CHECK_INTEGRITY, GET_ITEMS, UPDATE_ITEMS};
use crate::core_channel::{ChannelError, ChannelResult, EventStream, ServerChannel};
use crate::core_codec::decode_update_payload;
use crate::metrics;

/// Remote dispatch onto a [`StorageGateway`]
#[derive(Clone)]
pub struct GatewayChannel {
    gateway: StorageGateway,
}

impl GatewayChannel {
    pub fn new(gateway: StorageGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    pub fn into_server(self) -> Arc<dyn ServerChannel> {
        Arc::new(self)
    }
}

#[async_trait]
impl ServerChannel for GatewayChannel {
    async fn call(&self, command: &str, arg: Value) -> ChannelResult<Value> {
        match command {
            GET_ITEMS => {
                metrics::record_call(GET_ITEMS);
                let items = self.gateway.get_items().await;
                Ok(serde_json::to_value(items)?)
            }
            UPDATE_ITEMS => {
                metrics::record_call(UPDATE_ITEMS);
                let request = decode_update_payload(arg)?;
                self.gateway.update_items(request).await?;
                Ok(Value::Null)
            }
            CHECK_INTEGRITY => {
                metrics::record_call(CHECK_INTEGRITY);
                let full = arg.as_bool().ok_or_else(|| {
                    ChannelError::InvalidPayload("checkIntegrity expects a boolean".to_string())
                })?;
                let report = self.gateway.check_integrity(full).await?;
                Ok(Value::String(report))
            }
            _ => Err(ChannelError::UnknownCommand(command.to_string())),
        }
    }

    fn listen(&self, event: &str) -> ChannelResult<EventStream> {
        match event {
            CHANGE_EVENT => {
                let (handle, receiver) = self.gateway.on_did_change_items();
                Ok(EventStream::new(handle, receiver))
            }
            _ => Err(ChannelError::UnknownEvent(event.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::core_codec::decode_snapshot;
    use crate::core_storage::{InMemoryStorage, StorageBackend};
    use serde_json::json;

    fn channel() -> (GatewayChannel, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        let gateway = StorageGateway::new(storage.clone(), GatewayConfig::default());
        (GatewayChannel::new(gateway), storage)
    }

    #[tokio::test]
    async fn test_get_items_returns_item_array() {
        let (channel, storage) = channel();
        channel.gateway().initialize().await;
        storage.store("color", "blue").await.unwrap();

        let result = channel.call("getItems", Value::Null).await.unwrap();
        assert!(result.is_array());
        let snapshot = decode_snapshot(result).unwrap();
        assert_eq!(snapshot["color"], "blue");
    }

    #[tokio::test]
    async fn test_update_items_applies_request() {
        let (channel, storage) = channel();

        let result = channel
            .call(
                "updateItems",
                json!({ "insert": [["a", "1"], ["b", "2"]], "delete": ["b"] }),
            )
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
        assert_eq!(storage.get("a").as_deref(), Some("1"));
        assert_eq!(storage.get("b"), None);
    }

    #[tokio::test]
    async fn test_update_items_rejects_malformed_request() {
        let (channel, _storage) = channel();

        let err = channel
            .call("updateItems", json!({ "insert": "a=1" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_check_integrity_passthrough() {
        let (channel, _storage) = channel();

        let report = channel.call("checkIntegrity", json!(false)).await.unwrap();
        assert_eq!(report, json!("ok"));

        let err = channel.call("checkIntegrity", json!("yes")).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_unknown_names_are_hard_errors() {
        let (channel, _storage) = channel();

        assert_eq!(
            channel.call("dropAll", Value::Null).await.unwrap_err(),
            ChannelError::UnknownCommand("dropAll".to_string())
        );
        assert_eq!(
            channel.listen("onDidExplode").unwrap_err(),
            ChannelError::UnknownEvent("onDidExplode".to_string())
        );
    }

    #[tokio::test]
    async fn test_listen_registers_subscriber() {
        let (channel, _storage) = channel();

        let stream = channel.listen("onDidChangeItems").unwrap();
        assert_eq!(channel.gateway().subscriber_count(), 1);
        stream.handle.unsubscribe();
        assert_eq!(channel.gateway().subscriber_count(), 0);
    }
}
