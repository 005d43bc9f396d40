//! Chat service façade
//!
//! Ties the registry, session and connection together and exposes the
//! operations callers actually use. Local checks (identity, channel name,
//! limit) run before the broker is touched, so bad input never causes a
//! publish or fetch.

use std::sync::Arc;
use tracing::{debug, error};

use crate::broker::Connector;
use crate::channel::{ChannelRegistry, ChannelSummary};
use crate::config::ChatConfig;
use crate::connection::ConnectionManager;
use crate::error::{ChatError, ChatResult};
use crate::publisher::{self, PublishReceipt};
use crate::reader::{self, ReadOutcome};
use crate::session::{Handle, SessionState};

pub struct ChatService {
    config: ChatConfig,
    registry: Arc<ChannelRegistry>,
    session: SessionState,
    connections: ConnectionManager,
}

impl ChatService {
    /// Service over the default channel catalog
    pub fn new(config: ChatConfig, connector: Arc<dyn Connector>) -> Self {
        Self::with_registry(config, ChannelRegistry::default(), connector)
    }

    pub fn with_registry(
        config: ChatConfig,
        registry: ChannelRegistry,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let registry = Arc::new(registry);
        let connections =
            ConnectionManager::new(connector, Arc::clone(&registry), config.broker_url.clone());
        Self {
            config,
            registry,
            session: SessionState::new(),
            connections,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Set the handle used to sign every later message
    pub async fn set_handle(&self, handle: &str) -> ChatResult<Handle> {
        let handle = Handle::parse(handle)?;
        self.session.set_handle(handle.clone()).await;
        Ok(handle)
    }

    /// Current handle, `None` when unset
    pub async fn handle(&self) -> Option<Handle> {
        self.session.handle().await
    }

    /// Channel names and descriptions in catalog order
    pub fn list_channels(&self) -> Vec<ChannelSummary> {
        self.registry.list()
    }

    /// Connect and provision without performing an operation
    pub async fn ensure_ready(&self) -> ChatResult<()> {
        self.connections.ensure_connected().await.map(|_| ())
    }

    /// Publish `message` to `channel` under the current handle
    ///
    /// # Errors
    ///
    /// `NoIdentity` when no handle is set, `UnknownChannel` for a name not
    /// in the registry, otherwise connectivity or broker errors.
    pub async fn send_message(&self, channel: &str, message: &str) -> ChatResult<PublishReceipt> {
        let handle = self.session.require_handle().await?;
        let channel = self.registry.resolve(channel)?;

        let connection = self.connections.ensure_connected().await?;
        let result = publisher::publish(connection.client.as_ref(), channel, &handle, message).await;
        self.settle(result, "send_message").await
    }

    /// Read unread messages from `channel`, oldest first
    ///
    /// `limit` defaults to the configured read limit.
    pub async fn read_messages(&self, channel: &str, limit: Option<usize>) -> ChatResult<ReadOutcome> {
        let channel = self.registry.resolve(channel)?;
        let limit = limit.unwrap_or(self.config.default_read_limit);
        if limit == 0 || limit > self.config.max_read_limit {
            return Err(ChatError::InvalidLimit {
                limit,
                max: self.config.max_read_limit,
            });
        }

        let connection = self.connections.ensure_connected().await?;
        let result = reader::read(
            connection.client.as_ref(),
            connection.admin.as_ref(),
            channel,
            limit,
            self.config.fetch_timeout,
        )
        .await;
        if let Ok(outcome) = &result {
            debug!(
                channel = %channel.name,
                returned = outcome.messages().len(),
                skipped = outcome.skipped(),
                "Read completed"
            );
        }
        self.settle(result, "read_messages").await
    }

    /// Log a failed operation and drop the connection if the broker went away
    async fn settle<T>(&self, result: ChatResult<T>, operation: &str) -> ChatResult<T> {
        if let Err(err) = &result {
            error!(operation, error = %err, "Chat operation failed");
            if matches!(err, ChatError::Connectivity(_)) {
                self.connections.reset().await;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBroker;
    use std::time::Duration;

    fn service(broker: &InMemoryBroker) -> ChatService {
        let config = ChatConfig::builder()
            .broker_url("mem://local")
            .fetch_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        ChatService::new(config, Arc::new(broker.clone()))
    }

    #[tokio::test]
    async fn test_send_without_handle_never_publishes() {
        let broker = InMemoryBroker::new();
        let service = service(&broker);

        let err = service.send_message("roadmap", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::NoIdentity));
        assert_eq!(broker.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_limit_rejected_locally() {
        let broker = InMemoryBroker::new();
        let service = service(&broker);

        let err = service.read_messages("roadmap", Some(0)).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidLimit { limit: 0, .. }));
        assert_eq!(broker.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_handle_rejected() {
        let broker = InMemoryBroker::new();
        let service = service(&broker);

        assert!(matches!(
            service.set_handle(" ").await,
            Err(ChatError::InvalidHandle(_))
        ));
        assert!(service.handle().await.is_none());
    }

    #[tokio::test]
    async fn test_list_channels_needs_no_broker() {
        let broker = InMemoryBroker::new();
        broker.set_reachable(false);
        let service = service(&broker);

        assert_eq!(service.list_channels().len(), 3);
        assert_eq!(broker.connect_count(), 0);
    }
}
