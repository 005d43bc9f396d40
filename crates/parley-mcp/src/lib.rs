//! # Parley MCP - Model Context Protocol Integration
//!
//! Exposes Parley chat channels to MCP-compatible clients as five tools:
//! `set_handle`, `get_my_handle`, `list_channels`, `send_message` and
//! `read_messages`. Every tool answers with displayable text; failures are
//! flagged results rather than protocol errors.
//!
//! ## Example: MCP Server
//!
//! ```rust,no_run
//! use parley_mcp::ChatMcpServer;
//! use parley_mesh::{ChatConfig, ChatService, InMemoryBroker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ChatService::new(ChatConfig::from_env()?, Arc::new(InMemoryBroker::new()));
//!
//!     let server = ChatMcpServer::new(Arc::new(service));
//!     server.serve_stdio().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod server;
pub mod tools;

pub use error::{McpError, McpResult};
pub use server::ChatMcpServer;
pub use tools::{ChatTools, ToolResponse};
