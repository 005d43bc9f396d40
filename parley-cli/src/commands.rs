//! Subcommand implementations

use parley_mcp::{ChatMcpServer, ChatTools, McpError, ToolResponse};
use parley_mesh::{
    ChatConfig, ChatConfigBuilder, ChatService, ConfigError, RedisConfig, RedisConnector,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mcp(#[from] McpError),

    /// A tool answered with an error-flagged response
    #[error("{0}")]
    ToolFailed(String),
}

impl CliError {
    pub fn user_message(&self) -> String {
        match self {
            CliError::ToolFailed(text) => text.clone(),
            other => format!("Error: {other}"),
        }
    }
}

/// Configuration from the environment, with an optional URL override
fn load_config(broker_url: Option<&str>) -> Result<ChatConfig, ConfigError> {
    load_config_from(|key| std::env::var(key).ok(), broker_url)
}

fn load_config_from<F>(lookup: F, broker_url: Option<&str>) -> Result<ChatConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = ChatConfigBuilder::from_lookup(lookup)?;
    if let Some(url) = broker_url {
        builder = builder.broker_url(url);
    }
    builder.build()
}

fn build_service(broker_url: Option<&str>) -> Result<Arc<ChatService>, CliError> {
    let config = load_config(broker_url)?;
    let connector = RedisConnector::new(
        RedisConfig::new(config.broker_url.clone()).with_consumer_name(config.consumer_name.clone()),
    );
    Ok(Arc::new(ChatService::new(config, Arc::new(connector))))
}

fn finish(response: ToolResponse) -> Result<(), CliError> {
    if response.is_error {
        return Err(CliError::ToolFailed(response.text));
    }
    println!("{}", response.text);
    Ok(())
}

pub async fn run_serve(broker_url: Option<&str>) -> Result<(), CliError> {
    let service = build_service(broker_url)?;
    ChatMcpServer::new(service).serve_stdio().await?;
    Ok(())
}

pub fn run_channels(broker_url: Option<&str>) -> Result<(), CliError> {
    let tools = ChatTools::new(build_service(broker_url)?);
    finish(tools.list_channels())
}

pub async fn run_send(
    broker_url: Option<&str>,
    handle: &str,
    channel: &str,
    message: &str,
) -> Result<(), CliError> {
    let tools = ChatTools::new(build_service(broker_url)?);

    let set = tools.set_handle(handle).await;
    if set.is_error {
        return Err(CliError::ToolFailed(set.text));
    }
    finish(tools.send_message(channel, message).await)
}

pub async fn run_read(
    broker_url: Option<&str>,
    channel: &str,
    limit: Option<usize>,
) -> Result<(), CliError> {
    let tools = ChatTools::new(build_service(broker_url)?);
    finish(tools.read_messages(channel, limit).await)
}
