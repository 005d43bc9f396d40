//! MCP server exposing the chat tools over stdio

use crate::error::{McpError, McpResult};
use crate::tools::{ChatTools, ToolResponse};
use parley_mesh::ChatService;
use rmcp::{
    ErrorData, ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Request for the `set_handle` tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SetHandleRequest {
    #[schemars(description = "Your agent handle/username (e.g., 'project-manager', 'business-analyst')")]
    pub handle: String,
}

/// Request for the `send_message` tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SendMessageRequest {
    #[schemars(description = "Channel name (roadmap, parallel-work, or errors)")]
    pub channel: String,
    #[schemars(description = "The message to send")]
    pub message: String,
}

/// Request for the `read_messages` tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReadMessagesRequest {
    #[schemars(description = "Channel name (roadmap, parallel-work, or errors)")]
    pub channel: String,
    #[schemars(description = "Maximum number of messages to retrieve (default: 50)")]
    #[serde(default)]
    pub limit: Option<usize>,
}

impl From<ToolResponse> for CallToolResult {
    fn from(response: ToolResponse) -> Self {
        let content = vec![Content::text(response.text)];
        if response.is_error {
            CallToolResult::error(content)
        } else {
            CallToolResult::success(content)
        }
    }
}

/// MCP server over a shared chat service
#[derive(Clone)]
pub struct ChatMcpServer {
    tools: ChatTools,
    tool_router: ToolRouter<Self>,
}

#[tool_router(router = tool_router)]
impl ChatMcpServer {
    pub fn new(service: Arc<ChatService>) -> Self {
        Self {
            tools: ChatTools::new(service),
            tool_router: Self::tool_router(),
        }
    }

    pub fn tools(&self) -> &ChatTools {
        &self.tools
    }

    /// Serve via stdio (stdin/stdout) until the client disconnects
    pub async fn serve_stdio(self) -> McpResult<()> {
        info!(
            server = env!("CARGO_PKG_NAME"),
            version = env!("CARGO_PKG_VERSION"),
            channels = self.tools.service().registry().len(),
            "Starting MCP server on stdio"
        );

        let service = self
            .serve((tokio::io::stdin(), tokio::io::stdout()))
            .await
            .map_err(|e| McpError::TransportError(e.to_string()))?;
        service
            .waiting()
            .await
            .map_err(|e| McpError::ServerError(e.to_string()))?;

        info!("MCP client disconnected");
        Ok(())
    }

    #[tool(
        name = "set_handle",
        description = "Set your agent handle/username for the chat. This identifies you in all messages."
    )]
    async fn set_handle(
        &self,
        request: Parameters<SetHandleRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        debug!(tool = "set_handle", "Tool called");
        Ok(self.tools.set_handle(&request.0.handle).await.into())
    }

    #[tool(name = "get_my_handle", description = "Get your current agent handle")]
    async fn get_my_handle(&self) -> Result<CallToolResult, ErrorData> {
        Ok(self.tools.get_handle().await.into())
    }

    #[tool(name = "list_channels", description = "List all available chat channels")]
    async fn list_channels(&self) -> Result<CallToolResult, ErrorData> {
        Ok(self.tools.list_channels().into())
    }

    #[tool(name = "send_message", description = "Send a message to a channel")]
    async fn send_message(
        &self,
        request: Parameters<SendMessageRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let SendMessageRequest { channel, message } = request.0;
        debug!(tool = "send_message", channel = %channel, "Tool called");
        Ok(self.tools.send_message(&channel, &message).await.into())
    }

    #[tool(name = "read_messages", description = "Read recent messages from a channel")]
    async fn read_messages(
        &self,
        request: Parameters<ReadMessagesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let ReadMessagesRequest { channel, limit } = request.0;
        debug!(
            tool = "read_messages",
            channel = %channel,
            limit = ?limit,
            "Tool called"
        );
        Ok(self.tools.read_messages(&channel, limit).await.into())
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for ChatMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "parley".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Multi-channel chat for agents. Call set_handle first, then send_message and read_messages on roadmap, parallel-work or errors."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}
