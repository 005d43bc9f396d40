//! MCP error types

use parley_mesh::{ChatError, ConfigError};
use rmcp::model::Content;
use thiserror::Error;

/// MCP operation result type
pub type McpResult<T> = Result<T, McpError>;

/// Errors that can stop the MCP server itself
///
/// Individual tool failures are not errors at this level; they are
/// returned to the client as error-flagged tool results.
#[derive(Debug, Error)]
pub enum McpError {
    /// Transport error
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Server error
    #[error("Server error: {0}")]
    ServerError(String),

    /// Invalid configuration at startup
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Chat layer failure outside a tool call
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl McpError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            McpError::TransportError(_) => true,
            McpError::Chat(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl rmcp::model::IntoContents for McpError {
    fn into_contents(self) -> Vec<Content> {
        vec![Content::text(self.to_string())]
    }
}
