//! Redis Streams broker
//!
//! - a log is a stream keyed by the channel subject; its retention policy
//!   is registered once under `parley:log:<name>` with `SET NX`
//! - a durable reader is a consumer group created at id `0`
//! - fetch is `XREADGROUP`, ack is `XACK`
//!
//! Redis streams can cap length and age but not total bytes, replica
//! count or storage class; those fields are recorded with the policy only.

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use redis::streams::{
    StreamId, StreamInfoGroupsReply, StreamMaxlen, StreamReadOptions, StreamReadReply,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::broker::{
    BrokerConnection, ConsumerConfig, ConsumerHandle, Connector, CreateOutcome, DeliverPolicy,
    Delivery, FetchRequest, LogAdmin, LogClient, LogSpec, PublishAck,
};
use crate::channel::RetentionPolicy;
use crate::error::{ChatError, ChatResult};

/// Field holding the envelope bytes inside each stream entry
const PAYLOAD_FIELD: &str = "data";

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum number of connections in the pool
    pub pool_size: usize,
    /// Member name used inside every consumer group
    pub consumer_name: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            consumer_name: "parley".to_string(),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }
}

/// Opens [`RedisBroker`] connections
///
/// The endpoint passed to `connect` overrides `RedisConfig::url`.
#[derive(Debug, Clone, Default)]
pub struct RedisConnector {
    config: RedisConfig,
}

impl RedisConnector {
    pub fn new(config: RedisConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self, endpoint: &str) -> ChatResult<BrokerConnection> {
        let config = RedisConfig {
            url: endpoint.to_string(),
            ..self.config.clone()
        };
        let broker = Arc::new(RedisBroker::with_config(config).await?);
        Ok(BrokerConnection {
            client: broker.clone(),
            admin: broker,
        })
    }
}

/// Broker backed by Redis Streams
pub struct RedisBroker {
    pool: deadpool_redis::Pool,
    config: RedisConfig,
    /// subject -> retention, for logs provisioned through this broker
    retention: RwLock<HashMap<String, RetentionPolicy>>,
}

impl RedisBroker {
    pub async fn new(url: impl Into<String>) -> ChatResult<Self> {
        Self::with_config(RedisConfig::new(url)).await
    }

    pub async fn with_config(config: RedisConfig) -> ChatResult<Self> {
        let mut pool_config = deadpool_redis::Config::from_url(&config.url);
        pool_config.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));

        let pool = pool_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| ChatError::Connectivity(e.to_string()))?;

        // Test connection
        let mut conn = pool
            .get()
            .await
            .map_err(|e| ChatError::Connectivity(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| ChatError::Connectivity(format!("PING failed: {}", e)))?;

        debug!("Redis broker connected to {}", config.url);

        Ok(Self {
            pool,
            config,
            retention: RwLock::new(HashMap::new()),
        })
    }

    async fn get_connection(&self) -> ChatResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| ChatError::Connectivity(e.to_string()))
    }

    fn log_key(log: &str) -> String {
        format!("parley:log:{}", log)
    }

    /// Retention for a subject: from our cache, else from the registered policy
    async fn retention_for(
        &self,
        conn: &mut deadpool_redis::Connection,
        subject: &str,
    ) -> Option<RetentionPolicy> {
        if let Some(policy) = self.retention.read().await.get(subject) {
            return Some(policy.clone());
        }

        let registered: Option<String> = conn
            .get(Self::subject_key(subject))
            .await
            .ok()
            .flatten();
        let log = registered?;
        let raw: Option<String> = conn.get(Self::log_key(&log)).await.ok().flatten();
        let record: LogRecord = serde_json::from_str(&raw?).ok()?;

        self.retention
            .write()
            .await
            .insert(subject.to_string(), record.retention.clone());
        Some(record.retention)
    }

    fn subject_key(subject: &str) -> String {
        format!("parley:subject:{}", subject)
    }

    async fn read_group(
        &self,
        conn: &mut deadpool_redis::Connection,
        consumer: &ConsumerHandle,
        id: &str,
        count: usize,
        block: Option<usize>,
    ) -> ChatResult<Vec<StreamId>> {
        let mut options = StreamReadOptions::default()
            .group(&consumer.name, &self.config.consumer_name)
            .count(count);
        if let Some(ms) = block {
            options = options.block(ms);
        }

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&consumer.subject], &[id], &options)
            .await
            .map_err(|e| classify(e, ChatError::Fetch))?;

        Ok(reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default())
    }
}

/// Policy record stored once per log
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct LogRecord {
    subject: String,
    retention: RetentionPolicy,
    created_at: String,
}

/// Keep connectivity failures as such, wrap everything else with `wrap`
fn classify(err: redis::RedisError, wrap: impl FnOnce(String) -> ChatError) -> ChatError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        ChatError::Connectivity(err.to_string())
    } else {
        wrap(err.to_string())
    }
}

/// `XINFO` on an absent stream replies `ERR no such key`
fn is_missing_key(err: &redis::RedisError) -> bool {
    err.kind() == redis::ErrorKind::ResponseError
        && err.detail().is_some_and(|d| d.starts_with("no such key"))
}

fn provisioning_error(resource: String, err: redis::RedisError) -> ChatError {
    classify(err, |reason| ChatError::Provisioning { resource, reason })
}

/// An entry trimmed while pending comes back without fields; its empty
/// payload fails to parse and is acknowledged as malformed.
fn delivery(consumer: &ConsumerHandle, entry: &StreamId) -> Delivery {
    Delivery {
        consumer: consumer.clone(),
        position: entry.id.clone(),
        payload: entry.get::<Vec<u8>>(PAYLOAD_FIELD).unwrap_or_default(),
    }
}

#[async_trait]
impl LogAdmin for RedisBroker {
    async fn create_log(&self, spec: &LogSpec) -> ChatResult<CreateOutcome> {
        let mut conn = self.get_connection().await?;
        let record = LogRecord {
            subject: spec.subject.clone(),
            retention: spec.retention.clone(),
            created_at: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string(&record)?;

        let created: Option<String> = redis::cmd("SET")
            .arg(Self::log_key(&spec.name))
            .arg(json)
            .arg("NX")
            .query_async(&mut *conn)
            .await
            .map_err(|e| provisioning_error(format!("log {}", spec.name), e))?;

        conn.set::<_, _, ()>(Self::subject_key(&spec.subject), &spec.name)
            .await
            .map_err(|e| provisioning_error(format!("log {}", spec.name), e))?;

        // Cache the policy actually in force, which is ours only if we created it
        if created.is_some() {
            self.retention
                .write()
                .await
                .insert(spec.subject.clone(), spec.retention.clone());
            debug!(log = %spec.name, subject = %spec.subject, "Registered stream");
            Ok(CreateOutcome::Created)
        } else {
            Ok(CreateOutcome::AlreadyExists)
        }
    }

    async fn create_consumer(
        &self,
        log: &str,
        subject: &str,
        config: &ConsumerConfig,
    ) -> ChatResult<CreateOutcome> {
        let mut conn = self.get_connection().await?;
        let start = match config.deliver_policy {
            DeliverPolicy::All => "0",
        };

        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(subject, &config.durable_name, start)
            .await;

        match result {
            Ok(()) => {
                debug!(log, group = %config.durable_name, "Created consumer group");
                Ok(CreateOutcome::Created)
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(provisioning_error(
                format!("reader {}", config.durable_name),
                e,
            )),
        }
    }

    async fn get_consumer(
        &self,
        log: &str,
        subject: &str,
        name: &str,
    ) -> ChatResult<Option<ConsumerHandle>> {
        let mut conn = self.get_connection().await?;

        let reply: redis::RedisResult<StreamInfoGroupsReply> = conn.xinfo_groups(subject).await;
        let groups = match reply {
            Ok(groups) => groups,
            // Stream not created yet
            Err(e) if is_missing_key(&e) => return Ok(None),
            Err(e) => return Err(provisioning_error(format!("reader {name}"), e)),
        };

        Ok(groups
            .groups
            .iter()
            .any(|g| g.name == name)
            .then(|| ConsumerHandle {
                log: log.to_string(),
                subject: subject.to_string(),
                name: name.to_string(),
            }))
    }
}

#[async_trait]
impl LogClient for RedisBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> ChatResult<PublishAck> {
        let mut conn = self.get_connection().await?;
        let retention = self.retention_for(&mut conn, subject).await;

        let appended: redis::RedisResult<String> = match &retention {
            Some(policy) => {
                conn.xadd_maxlen(
                    subject,
                    StreamMaxlen::Approx(policy.max_messages as usize),
                    "*",
                    &[(PAYLOAD_FIELD, payload.as_slice())],
                )
                .await
            }
            None => {
                conn.xadd(subject, "*", &[(PAYLOAD_FIELD, payload.as_slice())])
                    .await
            }
        };
        let id = appended.map_err(|e| classify(e, ChatError::Publish))?;

        if let Some(policy) = retention {
            let cutoff = Utc::now().timestamp_millis() - policy.max_age.as_millis() as i64;
            if cutoff > 0 {
                // Age-based trim; failure only delays trimming
                let trimmed: redis::RedisResult<i64> = redis::cmd("XTRIM")
                    .arg(subject)
                    .arg("MINID")
                    .arg("~")
                    .arg(cutoff)
                    .query_async(&mut *conn)
                    .await;
                if let Err(e) = trimmed {
                    debug!(subject, error = %e, "Age trim failed");
                }
            }
        }

        let log = conn
            .get::<_, Option<String>>(Self::subject_key(subject))
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| subject.to_string());

        debug!(subject, id = %id, "Appended stream entry");
        Ok(PublishAck { log, position: id })
    }

    async fn fetch(
        &self,
        consumer: &ConsumerHandle,
        request: FetchRequest,
    ) -> ChatResult<Vec<Delivery>> {
        let mut conn = self.get_connection().await?;

        // Entries this member fetched earlier but never acknowledged
        let pending = self
            .read_group(&mut conn, consumer, "0", request.max_messages, None)
            .await?;
        let mut batch: Vec<Delivery> = pending.iter().map(|e| delivery(consumer, e)).collect();

        let remaining = request.max_messages.saturating_sub(batch.len());
        if remaining > 0 {
            let block = batch
                .is_empty()
                .then(|| request.timeout.as_millis().max(1) as usize);
            let fresh = self
                .read_group(&mut conn, consumer, ">", remaining, block)
                .await?;
            batch.extend(fresh.iter().map(|e| delivery(consumer, e)));
        }

        Ok(batch)
    }

    async fn ack(&self, delivery: &Delivery) -> ChatResult<()> {
        let mut conn = self.get_connection().await?;
        conn.xack::<_, _, _, i64>(
            &delivery.consumer.subject,
            &delivery.consumer.name,
            &[&delivery.position],
        )
        .await
        .map_err(|e| classify(e, ChatError::Ack))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config() {
        let config = RedisConfig::new("redis://localhost:6379")
            .with_pool_size(20)
            .with_consumer_name("agent-2");

        assert_eq!(config.pool_size, 20);
        assert_eq!(config.consumer_name, "agent-2");
    }

    #[test]
    fn test_missing_key_is_recognised_by_kind_and_detail() {
        let missing = redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "An error was signalled by the server",
            "no such key".to_string(),
        ));
        assert!(is_missing_key(&missing));

        // Same words outside a server reply do not count
        let io_like = redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection closed",
            "no such key".to_string(),
        ));
        assert!(!is_missing_key(&io_like));

        let wrong_group = redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "An error was signalled by the server",
            "NOGROUP No such key 'x' or consumer group 'y'".to_string(),
        ));
        assert!(!is_missing_key(&wrong_group));
    }

    #[test]
    fn test_key_generation() {
        assert_eq!(RedisBroker::log_key("CHAT_ROADMAP"), "parley:log:CHAT_ROADMAP");
        assert_eq!(
            RedisBroker::subject_key("chat.roadmap"),
            "parley:subject:chat.roadmap"
        );
    }

    #[test]
    fn test_log_record_round_trip() {
        let record = LogRecord {
            subject: "chat.errors".to_string(),
            retention: RetentionPolicy::default(),
            created_at: "2025-01-01T00:00:00+00:00".to_string(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: LogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.retention, RetentionPolicy::default());
        assert_eq!(back.subject, "chat.errors");
    }
}
