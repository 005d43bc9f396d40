//! Durable, acknowledged reads
//!
//! Each channel has one named durable consumer (`<logId>_READER`). A read
//! resolves or creates it, fetches a bounded batch with a soft deadline,
//! and acknowledges every record it returns or skips as malformed. Delivery is
//! at-least-once per reader: a process that dies between fetch and ack
//! will see those messages again.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::broker::{
    ConsumerConfig, ConsumerHandle, CreateOutcome, FetchRequest, LogAdmin, LogClient,
};
use crate::channel::Channel;
use crate::envelope::MessageEnvelope;
use crate::error::{ChatError, ChatResult};

/// Default number of messages returned by one read
pub const DEFAULT_READ_LIMIT: usize = 50;

/// Default soft deadline for a fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// How a durable reader was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderResolution {
    /// Already present on the broker
    Existing(ConsumerHandle),
    /// Created by this call, or by a racing creator between our lookup and create
    Provisioned {
        handle: ConsumerHandle,
        outcome: CreateOutcome,
    },
}

impl ReaderResolution {
    pub fn handle(&self) -> &ConsumerHandle {
        match self {
            Self::Existing(handle) => handle,
            Self::Provisioned { handle, .. } => handle,
        }
    }

    pub fn into_handle(self) -> ConsumerHandle {
        match self {
            Self::Existing(handle) => handle,
            Self::Provisioned { handle, .. } => handle,
        }
    }
}

/// Look up the channel's durable reader, creating it on a miss
///
/// Two-step protocol: resolve; on miss create (a conflict counts as
/// success), then resolve again.
pub async fn ensure_reader(admin: &dyn LogAdmin, channel: &Channel) -> ChatResult<ReaderResolution> {
    let name = channel.reader_name();

    if let Some(handle) = admin
        .get_consumer(&channel.log_id, &channel.subject, &name)
        .await?
    {
        return Ok(ReaderResolution::Existing(handle));
    }

    let outcome = admin
        .create_consumer(
            &channel.log_id,
            &channel.subject,
            &ConsumerConfig::durable(&name),
        )
        .await
        .map_err(|err| match err {
            ChatError::Connectivity(_) | ChatError::Provisioning { .. } => err,
            other => ChatError::Provisioning {
                resource: format!("reader {name}"),
                reason: other.to_string(),
            },
        })?;

    match outcome {
        CreateOutcome::Created => info!(channel = %channel.name, reader = %name, "Created durable reader"),
        CreateOutcome::AlreadyExists => {
            debug!(channel = %channel.name, reader = %name, "Durable reader created concurrently")
        }
    }

    let handle = admin
        .get_consumer(&channel.log_id, &channel.subject, &name)
        .await?
        .ok_or_else(|| ChatError::Provisioning {
            resource: format!("reader {name}"),
            reason: "not visible after creation".to_string(),
        })?;

    Ok(ReaderResolution::Provisioned { handle, outcome })
}

/// Messages returned by one read, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadBatch {
    pub messages: Vec<MessageEnvelope>,
    /// Delivered records that failed to parse and were left unacknowledged
    pub skipped: usize,
}

/// Result of a read
///
/// `Empty` means nothing new arrived before the deadline. It is not an
/// error and is kept distinct from broker failures, which surface as
/// `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Messages(ReadBatch),
    Empty { skipped: usize },
}

impl ReadOutcome {
    pub fn messages(&self) -> &[MessageEnvelope] {
        match self {
            Self::Messages(batch) => &batch.messages,
            Self::Empty { .. } => &[],
        }
    }

    pub fn skipped(&self) -> usize {
        match self {
            Self::Messages(batch) => batch.skipped,
            Self::Empty { skipped } => *skipped,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }
}

/// Fetch up to `limit` unread messages and acknowledge them
///
/// Malformed records are logged, counted and acknowledged so they never
/// hold back the records behind them. If an ack fails after some
/// messages were collected, the read stops there and returns them; the
/// unacknowledged rest is redelivered by the next read.
pub async fn read(
    client: &dyn LogClient,
    admin: &dyn LogAdmin,
    channel: &Channel,
    limit: usize,
    timeout: Duration,
) -> ChatResult<ReadOutcome> {
    let reader = ensure_reader(admin, channel).await?.into_handle();

    let deliveries = client
        .fetch(
            &reader,
            FetchRequest {
                max_messages: limit,
                timeout,
            },
        )
        .await?;
    debug!(channel = %channel.name, delivered = deliveries.len(), "Fetched batch");

    let mut batch = ReadBatch::default();
    for delivery in deliveries {
        let parsed = MessageEnvelope::from_slice(&delivery.payload);
        if let Err(err) = &parsed {
            warn!(
                channel = %channel.name,
                position = %delivery.position,
                error = %err,
                "Skipping malformed message"
            );
        }

        if let Err(err) = client.ack(&delivery).await {
            if batch.messages.is_empty() && batch.skipped == 0 {
                return Err(err);
            }
            warn!(
                channel = %channel.name,
                position = %delivery.position,
                error = %err,
                "Ack failed; returning partial batch"
            );
            break;
        }

        match parsed {
            Ok(envelope) => batch.messages.push(envelope),
            Err(_) => batch.skipped += 1,
        }
    }

    if batch.messages.is_empty() {
        Ok(ReadOutcome::Empty {
            skipped: batch.skipped,
        })
    } else {
        Ok(ReadOutcome::Messages(batch))
    }
}
