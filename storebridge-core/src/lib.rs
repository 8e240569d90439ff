pub mod config;
pub mod core_channel;
pub mod core_codec;
pub mod core_debounce;
pub mod core_events;
pub mod core_gateway;
pub mod core_proxy;
pub mod core_storage;
pub mod logging;
pub mod metrics;

pub use core_gateway::StorageGateway;
pub use core_proxy::StorageProxy;
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::core_channel::LoopbackChannel;
    use crate::core_codec::UpdateRequest;
    use crate::core_gateway::GatewayChannel;
    use crate::core_storage::InMemoryStorage;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_root_exports_wire_a_bridge() {
        let gateway = StorageGateway::new(Arc::new(InMemoryStorage::new()), GatewayConfig::default());
        let server = GatewayChannel::new(gateway.clone()).into_server();
        let proxy = StorageProxy::connect(Arc::new(LoopbackChannel::connect(server)))
            .await
            .unwrap();

        proxy
            .update_items(&UpdateRequest::new().insert("k", "v"))
            .await
            .unwrap();
        assert_eq!(proxy.get_items().await.unwrap()["k"], "v");
        assert!(gateway.is_ready());

        proxy.close();
        assert!(proxy.is_closed());
    }

    #[test]
    fn test_log_level_export() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warn));
    }
}
