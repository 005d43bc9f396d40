//! Broker-facing interface
//!
//! A broker keeps one append-only log per channel and named durable
//! consumers over those logs. The surface is split the way broker SDKs
//! usually split it: an administrative client that creates and looks up
//! logs and consumers, and a data client that appends, fetches and
//! acknowledges.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::channel::RetentionPolicy;
use crate::error::ChatResult;

/// Outcome of an idempotent create request
///
/// A conflict reported by the broker is classified as `AlreadyExists`,
/// never as an error, so creation can be retried freely and racing
/// creators converge without a prior existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

impl CreateOutcome {
    pub fn was_created(self) -> bool {
        matches!(self, Self::Created)
    }
}

/// How delivered messages are acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    Explicit,
}

/// Where a new consumer starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverPolicy {
    /// Start at the earliest message still retained
    All,
}

/// Pace at which stored messages are replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPolicy {
    /// As fast as the broker can deliver them
    Instant,
}

/// Durable consumer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub durable_name: String,
    pub ack_policy: AckPolicy,
    pub deliver_policy: DeliverPolicy,
    pub replay_policy: ReplayPolicy,
}

impl ConsumerConfig {
    /// Explicit acks, deliver from the earliest unacked message, instant replay
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            durable_name: name.into(),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: DeliverPolicy::All,
            replay_policy: ReplayPolicy::Instant,
        }
    }
}

/// Log creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSpec {
    pub name: String,
    pub subject: String,
    pub retention: RetentionPolicy,
}

/// Reference to a durable consumer owned by the broker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerHandle {
    pub log: String,
    pub subject: String,
    pub name: String,
}

impl fmt::Display for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.log, self.name)
    }
}

/// Bounds for a single fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub max_messages: usize,
    /// Soft deadline: on expiry whatever was collected is returned
    pub timeout: Duration,
}

/// Broker confirmation of an append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub log: String,
    /// Broker-assigned position of the appended record
    pub position: String,
}

/// A message handed out by a fetch, pending acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub consumer: ConsumerHandle,
    /// Broker-assigned position, used to acknowledge
    pub position: String,
    pub payload: Vec<u8>,
}

/// Administrative client: log and consumer management
#[async_trait]
pub trait LogAdmin: Send + Sync {
    /// Create a log bound to a subject with the given retention
    ///
    /// Returns `AlreadyExists` when a log with that name is already
    /// present; the existing log's policy is left untouched.
    async fn create_log(&self, spec: &LogSpec) -> ChatResult<CreateOutcome>;

    /// Create a durable consumer on a log
    async fn create_consumer(
        &self,
        log: &str,
        subject: &str,
        config: &ConsumerConfig,
    ) -> ChatResult<CreateOutcome>;

    /// Look up a durable consumer; `None` when it does not exist
    async fn get_consumer(
        &self,
        log: &str,
        subject: &str,
        name: &str,
    ) -> ChatResult<Option<ConsumerHandle>>;
}

/// Data client: append, fetch and acknowledge
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Append bytes to the log bound to `subject`
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> ChatResult<PublishAck>;

    /// Fetch up to `max_messages` unacknowledged messages in log order
    ///
    /// Messages previously delivered to this consumer but never
    /// acknowledged are delivered again ahead of new ones. An empty vec
    /// on timeout means "nothing new", not failure.
    async fn fetch(
        &self,
        consumer: &ConsumerHandle,
        request: FetchRequest,
    ) -> ChatResult<Vec<Delivery>>;

    /// Advance the consumer past a delivered message
    async fn ack(&self, delivery: &Delivery) -> ChatResult<()>;
}

/// Clients derived from one broker connection
#[derive(Clone)]
pub struct BrokerConnection {
    pub client: Arc<dyn LogClient>,
    pub admin: Arc<dyn LogAdmin>,
}

impl fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConnection").finish_non_exhaustive()
    }
}

/// Opens connections to a broker endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and derive the data and administrative clients
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Connectivity` when the broker is unreachable.
    async fn connect(&self, endpoint: &str) -> ChatResult<BrokerConnection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durable_consumer_config() {
        let config = ConsumerConfig::durable("CHAT_ERRORS_READER");
        assert_eq!(config.durable_name, "CHAT_ERRORS_READER");
        assert_eq!(config.ack_policy, AckPolicy::Explicit);
        assert_eq!(config.deliver_policy, DeliverPolicy::All);
        assert_eq!(config.replay_policy, ReplayPolicy::Instant);
    }

    #[test]
    fn test_create_outcome() {
        assert!(CreateOutcome::Created.was_created());
        assert!(!CreateOutcome::AlreadyExists.was_created());
    }
}
