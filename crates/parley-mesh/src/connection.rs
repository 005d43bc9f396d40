//! Lazily established, process-wide broker connection

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::broker::{BrokerConnection, Connector};
use crate::channel::{Channel, ChannelRegistry};
use crate::error::ChatResult;
use crate::provision::provision_all;

#[derive(Default)]
struct Slot {
    connection: Option<BrokerConnection>,
    /// Channels whose log is known to exist on the current connection
    provisioned: HashSet<String>,
}

/// Owns the single broker connection and its derived clients
///
/// The slot is behind a mutex so concurrent commands never open
/// duplicate connections or race each other through provisioning.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    registry: Arc<ChannelRegistry>,
    endpoint: String,
    slot: Mutex<Slot>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        registry: Arc<ChannelRegistry>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            registry,
            endpoint: endpoint.into(),
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Return the live connection, connecting first if needed
    ///
    /// Every call also provisions any channel whose log is not yet known
    /// to exist, so a channel that failed earlier is retried and a fully
    /// provisioned registry costs nothing. A failed connect leaves the
    /// slot empty and the next call starts over.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Connectivity` when the broker is unreachable.
    pub async fn ensure_connected(&self) -> ChatResult<BrokerConnection> {
        let mut slot = self.slot.lock().await;

        let connection = match &slot.connection {
            Some(connection) => connection.clone(),
            None => {
                let connection = self.connector.connect(&self.endpoint).await?;
                info!(endpoint = %self.endpoint, "Connected to broker");
                slot.connection = Some(connection.clone());
                slot.provisioned.clear();
                connection
            }
        };

        let missing: Vec<&Channel> = self
            .registry
            .channels()
            .iter()
            .filter(|c| !slot.provisioned.contains(&c.name))
            .collect();

        if !missing.is_empty() {
            let report = provision_all(connection.admin.as_ref(), missing).await;
            if !report.is_complete() {
                warn!(
                    failed = report.failed.len(),
                    "Some channels could not be provisioned; will retry on next command"
                );
            }
            let done: Vec<String> = report.provisioned_names().map(str::to_string).collect();
            slot.provisioned.extend(done);
        }

        Ok(connection)
    }

    /// Drop the current connection so the next command reconnects
    pub async fn reset(&self) {
        let mut slot = self.slot.lock().await;
        if slot.connection.take().is_some() {
            warn!(endpoint = %self.endpoint, "Broker connection reset");
        }
        slot.provisioned.clear();
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.connection.is_some()
    }

    /// Whether the channel's log is known to exist on the current connection
    pub async fn is_provisioned(&self, channel: &str) -> bool {
        self.slot.lock().await.provisioned.contains(channel)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::memory::InMemoryBroker;

    fn manager(broker: &InMemoryBroker) -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(broker.clone()),
            Arc::new(ChannelRegistry::default()),
            "mem://local",
        )
    }

    #[tokio::test]
    async fn test_connects_once_and_provisions_all() {
        let broker = InMemoryBroker::new();
        let manager = manager(&broker);

        manager.ensure_connected().await.unwrap();
        manager.ensure_connected().await.unwrap();

        assert_eq!(broker.connect_count(), 1);
        assert_eq!(broker.log_count().await, 3);
        assert!(manager.is_provisioned("errors").await);
    }

    #[tokio::test]
    async fn test_failed_connect_does_not_poison() {
        let broker = InMemoryBroker::new();
        broker.set_reachable(false);
        let manager = manager(&broker);

        let err = manager.ensure_connected().await.unwrap_err();
        assert!(matches!(err, ChatError::Connectivity(_)));
        assert!(!manager.is_connected().await);

        broker.set_reachable(true);
        manager.ensure_connected().await.unwrap();
        assert_eq!(broker.connect_count(), 2);
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_failed_channel_is_retried() {
        let broker = InMemoryBroker::new();
        broker.fail_log_creation("CHAT_ERRORS").await;
        let manager = manager(&broker);

        manager.ensure_connected().await.unwrap();
        assert!(manager.is_provisioned("roadmap").await);
        assert!(!manager.is_provisioned("errors").await);

        broker.clear_failures().await;
        manager.ensure_connected().await.unwrap();
        assert!(manager.is_provisioned("errors").await);
    }

    #[tokio::test]
    async fn test_reset_forces_reconnect() {
        let broker = InMemoryBroker::new();
        let manager = manager(&broker);

        manager.ensure_connected().await.unwrap();
        manager.reset().await;
        manager.ensure_connected().await.unwrap();

        assert_eq!(broker.connect_count(), 2);
        assert_eq!(broker.log_count().await, 3);
    }
}
