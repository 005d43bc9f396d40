//! Appending envelopes to a channel's log

use tracing::debug;

use crate::broker::{LogClient, PublishAck};
use crate::channel::Channel;
use crate::envelope::MessageEnvelope;
use crate::error::ChatResult;
use crate::session::Handle;

/// Confirmation of a published message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub channel: String,
    pub handle: String,
    pub envelope: MessageEnvelope,
    pub ack: PublishAck,
}

impl PublishReceipt {
    /// Human-readable confirmation naming sender and channel
    pub fn confirmation(&self) -> String {
        format!("Message sent to #{} by {}", self.channel, self.handle)
    }
}

/// Stamp `message` with `handle` and the current time, then append it
///
/// Ordering relative to other appends on the same log is whatever the
/// broker assigns.
pub async fn publish(
    client: &dyn LogClient,
    channel: &Channel,
    handle: &Handle,
    message: impl Into<String>,
) -> ChatResult<PublishReceipt> {
    let envelope = MessageEnvelope::new(handle, message);
    let payload = envelope.to_bytes()?;

    let ack = client.publish(&channel.subject, payload).await?;
    debug!(channel = %channel.name, handle = %handle, position = %ack.position, "Published message");

    Ok(PublishReceipt {
        channel: channel.name.clone(),
        handle: handle.as_str().to_string(),
        envelope,
        ack,
    })
}
