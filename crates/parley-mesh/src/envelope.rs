//! The record stored for every chat message

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ChatError, ChatResult};
use crate::session::Handle;

/// Sender handle, body and ISO-8601 timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub handle: String,
    pub message: String,
    pub timestamp: String,
}

impl MessageEnvelope {
    /// Stamp a message with the current wall-clock time
    pub fn new(handle: &Handle, message: impl Into<String>) -> Self {
        Self::at(handle, message, Utc::now())
    }

    /// Stamp a message with an explicit time
    pub fn at(handle: &Handle, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            handle: handle.as_str().to_string(),
            message: message.into(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Encode for the wire
    pub fn to_bytes(&self) -> ChatResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a stored record
    pub fn from_slice(bytes: &[u8]) -> ChatResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ChatError::MalformedMessage(e.to_string()))
    }
}

/// Renders as `[timestamp] handle: message`
impl fmt::Display for MessageEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.timestamp, self.handle, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_wire_shape() {
        let handle = Handle::parse("pm").unwrap();
        let envelope = MessageEnvelope::at(&handle, "kickoff", fixed_time());
        let value: serde_json::Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "handle": "pm",
                "message": "kickoff",
                "timestamp": "2025-03-14T09:26:53.000Z"
            })
        );
    }

    #[test]
    fn test_display_line() {
        let handle = Handle::parse("pm").unwrap();
        let envelope = MessageEnvelope::at(&handle, "kickoff", fixed_time());
        assert_eq!(envelope.to_string(), "[2025-03-14T09:26:53.000Z] pm: kickoff");
    }

    #[test]
    fn test_malformed_record() {
        assert!(matches!(
            MessageEnvelope::from_slice(b"not json"),
            Err(ChatError::MalformedMessage(_))
        ));
        assert!(matches!(
            MessageEnvelope::from_slice(br#"{"handle":"pm"}"#),
            Err(ChatError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_accepts_records_from_other_writers() {
        let raw = br#"{"handle":"qa","message":"green","timestamp":"2024-01-01T00:00:00Z","extra":1}"#;
        let envelope = MessageEnvelope::from_slice(raw).unwrap();
        assert_eq!(envelope.handle, "qa");
        assert_eq!(envelope.timestamp, "2024-01-01T00:00:00Z");
    }
}
