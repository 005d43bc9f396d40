//! Static channel catalog
//!
//! Every channel maps to exactly one persistent log on the broker. The
//! catalog is fixed at startup; there is no runtime creation or deletion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{ChatError, ChatResult};

/// Where the broker keeps a log's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    File,
    Memory,
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Limits governing how long a log retains messages before trimming
///
/// Applied once when the log is created; re-provisioning never updates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_messages: u64,
    pub max_bytes: u64,
    #[serde(with = "duration_secs")]
    pub max_age: Duration,
    pub replication_factor: u8,
    pub storage_class: StorageClass,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_messages: 10_000,
            max_bytes: 10 * 1024 * 1024, // 10MB
            max_age: Duration::from_secs(24 * 60 * 60),
            replication_factor: 1,
            storage_class: StorageClass::File,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// A named logical topic with its own persistent log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub description: String,
    /// Identity of the persistent log on the broker
    pub log_id: String,
    /// Subject that appends to the log are addressed to
    pub subject: String,
    pub retention: RetentionPolicy,
}

impl Channel {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        log_id: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            log_id: log_id.into(),
            subject: subject.into(),
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Name of this channel's durable reader
    ///
    /// Stable across processes so racing creators converge on one
    /// consumer and repeated reads advance instead of restarting.
    pub fn reader_name(&self) -> String {
        format!("{}_READER", self.log_id)
    }
}

/// Public view of a channel returned by `list_channels`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub name: String,
    pub description: String,
}

/// Ordered, immutable catalog of channels
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    /// Build a registry from an explicit list, rejecting duplicate names,
    /// log ids or subjects
    pub fn new(channels: Vec<Channel>) -> ChatResult<Self> {
        for (i, channel) in channels.iter().enumerate() {
            for other in &channels[..i] {
                if other.name == channel.name
                    || other.log_id == channel.log_id
                    || other.subject == channel.subject
                {
                    return Err(ChatError::Config(format!(
                        "channel '{}' collides with '{}'",
                        channel.name, other.name
                    )));
                }
            }
        }
        Ok(Self { channels })
    }

    /// Look a channel up by name
    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Look a channel up by name, failing with `UnknownChannel`
    pub fn resolve(&self, name: &str) -> ChatResult<&Channel> {
        self.get(name)
            .ok_or_else(|| ChatError::UnknownChannel(name.to_string()))
    }

    /// All channels in catalog order
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Name/description pairs in catalog order
    pub fn list(&self) -> Vec<ChannelSummary> {
        self.channels
            .iter()
            .map(|c| ChannelSummary {
                name: c.name.clone(),
                description: c.description.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self {
            channels: vec![
                Channel::new(
                    "roadmap",
                    "Discussion about project roadmap and planning",
                    "CHAT_ROADMAP",
                    "chat.roadmap",
                ),
                Channel::new(
                    "parallel-work",
                    "Coordination for parallel work among agents",
                    "CHAT_PARALLEL_WORK",
                    "chat.parallel-work",
                ),
                Channel::new(
                    "errors",
                    "Error reporting and troubleshooting",
                    "CHAT_ERRORS",
                    "chat.errors",
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_order() {
        let registry = ChannelRegistry::default();
        let names: Vec<_> = registry.list().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["roadmap", "parallel-work", "errors"]);
    }

    #[test]
    fn test_reader_name() {
        let registry = ChannelRegistry::default();
        let channel = registry.resolve("parallel-work").unwrap();
        assert_eq!(channel.reader_name(), "CHAT_PARALLEL_WORK_READER");
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = ChannelRegistry::default();
        let err = registry.resolve("bogus").unwrap_err();
        assert!(matches!(err, ChatError::UnknownChannel(name) if name == "bogus"));
    }

    #[test]
    fn test_duplicate_channels_rejected() {
        let result = ChannelRegistry::new(vec![
            Channel::new("a", "first", "LOG_A", "chat.a"),
            Channel::new("b", "second", "LOG_A", "chat.b"),
        ]);
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn test_default_retention() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_messages, 10_000);
        assert_eq!(policy.max_bytes, 10_485_760);
        assert_eq!(policy.max_age, Duration::from_secs(86_400));
        assert_eq!(policy.storage_class, StorageClass::File);
    }

    #[test]
    fn test_retention_serializes_age_in_seconds() {
        let json = serde_json::to_value(RetentionPolicy::default()).unwrap();
        assert_eq!(json["max_age"], 86_400);
        assert_eq!(json["storage_class"], "file");
    }
}
