//! Idempotent log provisioning
//!
//! Provisioning is a reconciliation step, not a one-time setup: it can be
//! run any number of times and a log that already exists counts as done.

use tracing::{debug, info, warn};

use crate::broker::{CreateOutcome, LogAdmin, LogSpec};
use crate::channel::Channel;
use crate::error::{ChatError, ChatResult};

/// Ensure the channel's log exists with its declared retention policy
///
/// # Errors
///
/// Returns `ChatError::Provisioning` for any failure other than the log
/// already existing. Connectivity failures are passed through unchanged.
pub async fn ensure_stream(admin: &dyn LogAdmin, channel: &Channel) -> ChatResult<CreateOutcome> {
    let spec = LogSpec {
        name: channel.log_id.clone(),
        subject: channel.subject.clone(),
        retention: channel.retention.clone(),
    };

    match admin.create_log(&spec).await {
        Ok(CreateOutcome::Created) => {
            info!(channel = %channel.name, log = %channel.log_id, "Created log");
            Ok(CreateOutcome::Created)
        }
        Ok(CreateOutcome::AlreadyExists) => {
            debug!(channel = %channel.name, log = %channel.log_id, "Log already exists");
            Ok(CreateOutcome::AlreadyExists)
        }
        Err(err @ ChatError::Connectivity(_)) => Err(err),
        Err(err @ ChatError::Provisioning { .. }) => Err(err),
        Err(err) => Err(ChatError::Provisioning {
            resource: format!("log {}", channel.log_id),
            reason: err.to_string(),
        }),
    }
}

/// Per-channel result of a provisioning pass
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub provisioned: Vec<(String, CreateOutcome)>,
    pub failed: Vec<(String, ChatError)>,
}

impl ProvisionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Names of channels that are known to have a log
    pub fn provisioned_names(&self) -> impl Iterator<Item = &str> {
        self.provisioned.iter().map(|(name, _)| name.as_str())
    }
}

/// Provision every channel independently
///
/// A failure on one channel is logged and recorded; it never stops the
/// remaining channels from being attempted.
pub async fn provision_all<'a, I>(admin: &dyn LogAdmin, channels: I) -> ProvisionReport
where
    I: IntoIterator<Item = &'a Channel>,
{
    let mut report = ProvisionReport::default();

    for channel in channels {
        match ensure_stream(admin, channel).await {
            Ok(outcome) => report.provisioned.push((channel.name.clone(), outcome)),
            Err(err) => {
                warn!(channel = %channel.name, log = %channel.log_id, error = %err, "Log provisioning failed");
                report.failed.push((channel.name.clone(), err));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistry;
    use crate::memory::InMemoryBroker;

    #[tokio::test]
    async fn test_second_provision_is_noop() {
        let broker = InMemoryBroker::new();
        let registry = ChannelRegistry::default();
        let channel = registry.resolve("roadmap").unwrap();

        let first = ensure_stream(&broker, channel).await.unwrap();
        let second = ensure_stream(&broker, channel).await.unwrap();

        assert_eq!(first, CreateOutcome::Created);
        assert_eq!(second, CreateOutcome::AlreadyExists);
        assert_eq!(broker.log_count().await, 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_channel() {
        let broker = InMemoryBroker::new();
        broker.fail_log_creation("CHAT_PARALLEL_WORK").await;
        let registry = ChannelRegistry::default();

        let report = provision_all(&broker, registry.channels()).await;

        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "parallel-work");
        assert!(matches!(report.failed[0].1, ChatError::Provisioning { .. }));
        let ok: Vec<_> = report.provisioned_names().collect();
        assert_eq!(ok, vec!["roadmap", "errors"]);
    }

    #[tokio::test]
    async fn test_existing_policy_is_not_updated() {
        let broker = InMemoryBroker::new();
        let registry = ChannelRegistry::default();
        let channel = registry.resolve("errors").unwrap().clone();
        ensure_stream(&broker, &channel).await.unwrap();

        let mut changed = channel.retention.clone();
        changed.max_messages = 5;
        let changed_channel = channel.clone().with_retention(changed);
        ensure_stream(&broker, &changed_channel).await.unwrap();

        let stored = broker.retention_of("CHAT_ERRORS").await.unwrap();
        assert_eq!(stored.max_messages, 10_000);
    }
}
