//! Error types for chat operations

use thiserror::Error;

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors that can occur while provisioning, publishing or reading
///
/// An empty fetch is not represented here: "nothing new" is a normal
/// outcome (see [`crate::ReadOutcome::Empty`]).
#[derive(Error, Debug)]
pub enum ChatError {
    /// Broker unreachable. Fatal for the current command only; the next
    /// command reconnects from scratch.
    #[error("Connection failed: {0}")]
    Connectivity(String),

    /// Log or durable reader creation failed for a reason other than
    /// "already exists"
    #[error("Provisioning of {resource} failed: {reason}")]
    Provisioning { resource: String, reason: String },

    /// Publish attempted before a handle was set
    #[error("No handle set")]
    NoIdentity,

    /// Channel name is not in the registry
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Handle rejected by validation
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Read limit outside the accepted range
    #[error("Invalid limit {limit}: must be between 1 and {max}")]
    InvalidLimit { limit: usize, max: usize },

    /// A stored record is not a valid envelope
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Broker rejected an append
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Broker failed while fetching a batch
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Broker failed to record an acknowledgement
    #[error("Ack failed: {0}")]
    Ack(String),

    /// Envelope serialization failed
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ChatError {
    /// One-line explanation suitable for showing to the caller.
    ///
    /// Broker-internal detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Connectivity(_) => {
                "Message broker connection failed. Make sure the broker is running and reachable."
                    .to_string()
            }
            ChatError::Provisioning { resource, .. } => {
                format!("Could not prepare {resource} on the message broker.")
            }
            ChatError::NoIdentity => {
                "You must set a handle first using set_handle tool.".to_string()
            }
            ChatError::UnknownChannel(name) => format!("Invalid channel: {name}"),
            ChatError::InvalidHandle(reason) => format!("Invalid handle: {reason}"),
            ChatError::InvalidLimit { limit, max } => {
                format!("Invalid limit {limit}: must be between 1 and {max}")
            }
            ChatError::MalformedMessage(_) => "A stored message could not be parsed.".to_string(),
            ChatError::Publish(_) => "The message broker rejected the message.".to_string(),
            ChatError::Fetch(_) => "Fetching messages from the broker failed.".to_string(),
            ChatError::Ack(_) => "Acknowledging messages with the broker failed.".to_string(),
            ChatError::Serialization(_) => "The message could not be encoded.".to_string(),
            ChatError::Config(reason) => format!("Invalid configuration: {reason}"),
        }
    }

    /// Check if this error is transient and the command may succeed if
    /// simply repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatError::Connectivity(_) | ChatError::Publish(_) | ChatError::Fetch(_)
        )
    }

    /// Check if the caller can fix this error by changing its input
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            ChatError::NoIdentity
                | ChatError::UnknownChannel(_)
                | ChatError::InvalidHandle(_)
                | ChatError::InvalidLimit { .. }
        )
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for ChatError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            ChatError::Connectivity(err.to_string())
        } else {
            ChatError::Fetch(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_is_single_line() {
        let errors = [
            ChatError::Connectivity("dial tcp 127.0.0.1:6379: refused".into()),
            ChatError::Provisioning {
                resource: "log CHAT_ROADMAP".into(),
                reason: "ERR out of memory".into(),
            },
            ChatError::NoIdentity,
            ChatError::UnknownChannel("bogus".into()),
            ChatError::Fetch("ERR protocol".into()),
        ];

        for err in errors {
            let msg = err.user_message();
            assert!(!msg.contains('\n'), "multi-line message: {msg}");
            assert!(!msg.is_empty());
        }
    }

    #[test]
    fn test_user_message_hides_broker_detail() {
        let err = ChatError::Connectivity("dial tcp 127.0.0.1:6379: refused".into());
        assert!(!err.user_message().contains("6379"));
    }

    #[test]
    fn test_error_classification() {
        assert!(ChatError::Connectivity("down".into()).is_retryable());
        assert!(!ChatError::NoIdentity.is_retryable());
        assert!(ChatError::NoIdentity.is_user_correctable());
        assert!(ChatError::UnknownChannel("x".into()).is_user_correctable());
        assert!(!ChatError::Fetch("x".into()).is_user_correctable());
    }

    #[test]
    fn test_unknown_channel_message() {
        let err = ChatError::UnknownChannel("bogus".into());
        assert_eq!(err.user_message(), "Invalid channel: bogus");
    }
}
