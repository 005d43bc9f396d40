//! Process-wide caller identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ChatError, ChatResult};

/// Name a caller signs its messages with
///
/// The only rule is that it is not blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(String);

impl Handle {
    /// Parse a handle, rejecting empty and whitespace-only input
    ///
    /// ```
    /// use parley_mesh::Handle;
    ///
    /// assert!(Handle::parse("project-manager").is_ok());
    /// assert!(Handle::parse("").is_err());
    /// assert!(Handle::parse("   ").is_err());
    /// ```
    pub fn parse(handle: impl AsRef<str>) -> ChatResult<Self> {
        let s = handle.as_ref();
        if s.trim().is_empty() {
            return Err(ChatError::InvalidHandle(
                "handle cannot be empty".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Current handle of this process
///
/// One handle per process, shared by every channel, never persisted.
/// Clones share the same cell.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    handle: Arc<RwLock<Option<Handle>>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the handle unconditionally
    pub async fn set_handle(&self, handle: Handle) {
        let mut slot = self.handle.write().await;
        debug!(handle = %handle, previous = ?slot.as_ref().map(Handle::as_str), "Handle set");
        *slot = Some(handle);
    }

    /// Current handle, or `None` when unset
    pub async fn handle(&self) -> Option<Handle> {
        self.handle.read().await.clone()
    }

    /// Current handle, failing with `NoIdentity` when unset
    pub async fn require_handle(&self) -> ChatResult<Handle> {
        self.handle().await.ok_or(ChatError::NoIdentity)
    }
}
