//! In-process broker
//!
//! Implements the full broker surface in memory: logs with retention,
//! durable consumers with explicit acknowledgement and redelivery of
//! unacknowledged messages. Clones share state, so several
//! [`ChatService`](crate::ChatService) instances built on clones behave
//! like several processes talking to one broker.
//!
//! Also carries fault-injection hooks and call counters for tests.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use crate::broker::{
    BrokerConnection, ConsumerConfig, ConsumerHandle, Connector, CreateOutcome, Delivery,
    FetchRequest, LogAdmin, LogClient, LogSpec, PublishAck,
};
use crate::channel::RetentionPolicy;
use crate::error::{ChatError, ChatResult};

#[derive(Debug)]
struct Record {
    seq: u64,
    payload: Vec<u8>,
    stored_at: Instant,
}

#[derive(Debug)]
struct Log {
    retention: RetentionPolicy,
    records: VecDeque<Record>,
    bytes: u64,
    next_seq: u64,
}

impl Log {
    fn new(spec: &LogSpec) -> Self {
        Self {
            retention: spec.retention.clone(),
            records: VecDeque::new(),
            bytes: 0,
            next_seq: 1,
        }
    }

    fn append(&mut self, payload: Vec<u8>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.bytes += payload.len() as u64;
        self.records.push_back(Record {
            seq,
            payload,
            stored_at: Instant::now(),
        });
        self.trim();
        seq
    }

    /// Drop oldest records until every retention limit holds
    fn trim(&mut self) {
        let max_age = self.retention.max_age;
        while let Some(front) = self.records.front() {
            let over_count = self.records.len() as u64 > self.retention.max_messages;
            let over_bytes = self.bytes > self.retention.max_bytes;
            let expired = front.stored_at.elapsed() > max_age;
            if !(over_count || over_bytes || expired) {
                break;
            }
            if let Some(dropped) = self.records.pop_front() {
                self.bytes -= dropped.payload.len() as u64;
            }
        }
    }

    fn get(&self, seq: u64) -> Option<&Record> {
        self.records.iter().find(|r| r.seq == seq)
    }
}

#[derive(Debug, Default)]
struct Consumer {
    /// Next sequence never delivered to this consumer
    cursor: u64,
    /// Delivered but not yet acknowledged
    pending: BTreeSet<u64>,
}

#[derive(Debug, Default)]
struct State {
    logs: HashMap<String, Log>,
    /// subject -> log name
    subjects: HashMap<String, String>,
    /// (log, consumer name) -> consumer
    consumers: HashMap<(String, String), Consumer>,
    failing_logs: HashSet<String>,
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    publishes: AtomicUsize,
    fetches: AtomicUsize,
    acks: AtomicUsize,
}

/// Broker that lives entirely in process memory
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    state: Arc<RwLock<State>>,
    appended: Arc<Notify>,
    reachable: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            appended: Arc::new(Notify::new()),
            reachable: Arc::new(AtomicBool::new(true)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Make subsequent `connect` calls fail (or succeed again)
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make `create_log` fail for the named log until cleared
    pub async fn fail_log_creation(&self, log: impl Into<String>) {
        self.state.write().await.failing_logs.insert(log.into());
    }

    /// Undo [`fail_log_creation`](Self::fail_log_creation)
    pub async fn clear_failures(&self) {
        self.state.write().await.failing_logs.clear();
    }

    /// Append raw bytes to a log without going through a client
    pub async fn append_raw(&self, subject: &str, payload: impl Into<Vec<u8>>) -> ChatResult<u64> {
        let mut state = self.state.write().await;
        let log_name = state
            .subjects
            .get(subject)
            .cloned()
            .ok_or_else(|| ChatError::Publish(format!("no log bound to subject {subject}")))?;
        let seq = state
            .logs
            .get_mut(&log_name)
            .map(|log| log.append(payload.into()))
            .ok_or_else(|| ChatError::Publish(format!("log {log_name} vanished")))?;
        drop(state);
        self.appended.notify_waiters();
        Ok(seq)
    }

    pub async fn log_count(&self) -> usize {
        self.state.read().await.logs.len()
    }

    /// Number of records currently retained by a log
    pub async fn record_count(&self, log: &str) -> usize {
        self.state
            .read()
            .await
            .logs
            .get(log)
            .map_or(0, |l| l.records.len())
    }

    pub async fn retention_of(&self, log: &str) -> Option<RetentionPolicy> {
        self.state
            .read()
            .await
            .logs
            .get(log)
            .map(|l| l.retention.clone())
    }

    pub async fn consumer_count(&self, log: &str) -> usize {
        self.state
            .read()
            .await
            .consumers
            .keys()
            .filter(|(l, _)| l == log)
            .count()
    }

    /// Messages delivered to a consumer and still awaiting ack
    pub async fn pending_count(&self, log: &str, consumer: &str) -> usize {
        self.state
            .read()
            .await
            .consumers
            .get(&(log.to_string(), consumer.to_string()))
            .map_or(0, |c| c.pending.len())
    }

    pub fn connect_count(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.counters.publishes.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.counters.fetches.load(Ordering::SeqCst)
    }

    pub fn ack_count(&self) -> usize {
        self.counters.acks.load(Ordering::SeqCst)
    }

    /// Collect up to `max` deliveries: pending ones first, then new ones
    async fn take_batch(&self, consumer: &ConsumerHandle, max: usize) -> ChatResult<Vec<Delivery>> {
        let mut state = self.state.write().await;
        let State {
            logs, consumers, ..
        } = &mut *state;

        let log = logs
            .get(&consumer.log)
            .ok_or_else(|| ChatError::Fetch(format!("log {} not found", consumer.log)))?;
        let tracked = consumers
            .get_mut(&(consumer.log.clone(), consumer.name.clone()))
            .ok_or_else(|| ChatError::Fetch(format!("consumer {consumer} not found")))?;

        // Records trimmed by retention can never be acknowledged
        tracked.pending.retain(|seq| log.get(*seq).is_some());

        let mut batch = Vec::new();
        for seq in tracked.pending.iter().copied() {
            if batch.len() >= max {
                break;
            }
            if let Some(record) = log.get(seq) {
                batch.push(delivery(consumer, record));
            }
        }

        let start = tracked.cursor;
        for record in log.records.iter().filter(|r| r.seq >= start) {
            if batch.len() >= max {
                break;
            }
            batch.push(delivery(consumer, record));
            tracked.pending.insert(record.seq);
            tracked.cursor = record.seq + 1;
        }

        Ok(batch)
    }
}

fn delivery(consumer: &ConsumerHandle, record: &Record) -> Delivery {
    Delivery {
        consumer: consumer.clone(),
        position: record.seq.to_string(),
        payload: record.payload.clone(),
    }
}

#[async_trait]
impl LogAdmin for InMemoryBroker {
    async fn create_log(&self, spec: &LogSpec) -> ChatResult<CreateOutcome> {
        let mut state = self.state.write().await;

        if state.failing_logs.contains(&spec.name) {
            return Err(ChatError::Provisioning {
                resource: format!("log {}", spec.name),
                reason: "injected failure".to_string(),
            });
        }
        if state.logs.contains_key(&spec.name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        if let Some(owner) = state.subjects.get(&spec.subject) {
            return Err(ChatError::Provisioning {
                resource: format!("log {}", spec.name),
                reason: format!("subject {} already bound to {owner}", spec.subject),
            });
        }

        state
            .subjects
            .insert(spec.subject.clone(), spec.name.clone());
        state.logs.insert(spec.name.clone(), Log::new(spec));
        debug!(log = %spec.name, subject = %spec.subject, "In-memory log created");
        Ok(CreateOutcome::Created)
    }

    async fn create_consumer(
        &self,
        log: &str,
        _subject: &str,
        config: &ConsumerConfig,
    ) -> ChatResult<CreateOutcome> {
        let mut state = self.state.write().await;

        let first_seq = match state.logs.get(log) {
            Some(l) => l.records.front().map_or(l.next_seq, |r| r.seq),
            None => {
                return Err(ChatError::Provisioning {
                    resource: format!("reader {}", config.durable_name),
                    reason: format!("log {log} not found"),
                });
            }
        };

        let key = (log.to_string(), config.durable_name.clone());
        if state.consumers.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.consumers.insert(
            key,
            Consumer {
                cursor: first_seq,
                pending: BTreeSet::new(),
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn get_consumer(
        &self,
        log: &str,
        subject: &str,
        name: &str,
    ) -> ChatResult<Option<ConsumerHandle>> {
        let state = self.state.read().await;
        let exists = state
            .consumers
            .contains_key(&(log.to_string(), name.to_string()));
        Ok(exists.then(|| ConsumerHandle {
            log: log.to_string(),
            subject: subject.to_string(),
            name: name.to_string(),
        }))
    }
}

#[async_trait]
impl LogClient for InMemoryBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> ChatResult<PublishAck> {
        self.counters.publishes.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.write().await;
        let log_name = state
            .subjects
            .get(subject)
            .cloned()
            .ok_or_else(|| ChatError::Publish(format!("no log bound to subject {subject}")))?;
        let seq = state
            .logs
            .get_mut(&log_name)
            .map(|log| log.append(payload))
            .ok_or_else(|| ChatError::Publish(format!("log {log_name} vanished")))?;
        drop(state);

        self.appended.notify_waiters();
        Ok(PublishAck {
            log: log_name,
            position: seq.to_string(),
        })
    }

    async fn fetch(
        &self,
        consumer: &ConsumerHandle,
        request: FetchRequest,
    ) -> ChatResult<Vec<Delivery>> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        let deadline = tokio::time::Instant::now() + request.timeout;

        loop {
            // Register interest before looking so an append in between is not missed
            let appended = self.appended.notified();

            let batch = self.take_batch(consumer, request.max_messages).await?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> ChatResult<()> {
        self.counters.acks.fetch_add(1, Ordering::SeqCst);

        let seq: u64 = delivery
            .position
            .parse()
            .map_err(|_| ChatError::Ack(format!("bad position {}", delivery.position)))?;
        let key = (
            delivery.consumer.log.clone(),
            delivery.consumer.name.clone(),
        );

        let mut state = self.state.write().await;
        let consumer = state
            .consumers
            .get_mut(&key)
            .ok_or_else(|| ChatError::Ack(format!("consumer {} not found", delivery.consumer)))?;
        consumer.pending.remove(&seq);
        Ok(())
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn connect(&self, endpoint: &str) -> ChatResult<BrokerConnection> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ChatError::Connectivity(format!(
                "broker at {endpoint} is unreachable"
            )));
        }

        Ok(BrokerConnection {
            client: Arc::new(self.clone()),
            admin: Arc::new(self.clone()),
        })
    }
}
