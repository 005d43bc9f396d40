//! # Parley
//!
//! Durable multi-channel chat for cooperating agents.
//!
//! ## Crates
//!
//! - **[`mesh`]**: channel registry, session identity, provisioning, publishing and durable reads
//! - **[`mcp`]**: the five chat tools and an MCP server serving them over stdio
//!
//! ## Quick Start
//!
//! ```rust
//! use parley::{ChatConfig, ChatService, ChatTools, InMemoryBroker};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = ChatConfig::builder()
//!     .fetch_timeout(std::time::Duration::from_millis(50))
//!     .build()
//!     .unwrap();
//! let service = ChatService::new(config, Arc::new(InMemoryBroker::new()));
//! let tools = ChatTools::new(Arc::new(service));
//!
//! tools.set_handle("pm").await;
//! let sent = tools.send_message("roadmap", "kickoff").await;
//! assert_eq!(sent.text, "Message sent to #roadmap by pm");
//! # });
//! ```

pub use parley_mcp as mcp;
pub use parley_mesh as mesh;

pub use parley_mcp::{ChatMcpServer, ChatTools, McpError, ToolResponse};
pub use parley_mesh::{
    Channel, ChannelRegistry, ChatConfig, ChatError, ChatResult, ChatService, Handle,
    InMemoryBroker, MessageEnvelope, ReadOutcome, SessionState,
};
