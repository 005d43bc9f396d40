//! # Parley Mesh
//!
//! Durable, multi-channel chat for cooperating agents.
//!
//! A fixed catalog of named channels is backed by append-only logs on a
//! broker. Each process picks a handle, publishes signed messages to a
//! channel, and reads what it has not yet seen through a durable reader
//! whose position survives restarts.
//!
//! ## Features
//!
//! - **Channel Catalog**: Static registry mapping names to logs and subjects
//! - **Idempotent Provisioning**: Logs and readers are created on first use and never updated
//! - **Durable Reads**: Acknowledged messages are never returned again
//! - **Pluggable Brokers**: Redis Streams in production, an in-memory broker for tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use parley_mesh::{ChatConfig, ChatService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     # #[cfg(feature = "redis")]
//!     # {
//!     let connector = Arc::new(parley_mesh::RedisConnector::default());
//!     let service = ChatService::new(ChatConfig::from_env()?, connector);
//!
//!     service.set_handle("pm").await?;
//!     service.send_message("roadmap", "kickoff").await?;
//!
//!     let outcome = service.read_messages("roadmap", Some(10)).await?;
//!     for message in outcome.messages() {
//!         println!("{message}");
//!     }
//!     # }
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod channel;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod provision;
pub mod publisher;
pub mod reader;
pub mod service;
pub mod session;

#[cfg(feature = "redis")]
pub mod redis;

pub use broker::{
    BrokerConnection, ConsumerConfig, ConsumerHandle, Connector, CreateOutcome, Delivery,
    FetchRequest, LogAdmin, LogClient, LogSpec, PublishAck,
};
pub use channel::{Channel, ChannelRegistry, ChannelSummary, RetentionPolicy, StorageClass};
pub use config::{ChatConfig, ChatConfigBuilder, ConfigError};
pub use connection::ConnectionManager;
pub use envelope::MessageEnvelope;
pub use error::{ChatError, ChatResult};
pub use memory::InMemoryBroker;
pub use provision::{ProvisionReport, ensure_stream, provision_all};
pub use publisher::PublishReceipt;
pub use reader::{ReadBatch, ReadOutcome, ReaderResolution, ensure_reader};
pub use service::ChatService;
pub use session::{Handle, SessionState};

#[cfg(feature = "redis")]
pub use self::redis::{RedisBroker, RedisConfig, RedisConnector};
