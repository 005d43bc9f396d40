//! Text-returning chat tools
//!
//! Each operation returns a [`ToolResponse`] whose text can be shown to
//! the caller as-is. Failures never escape as `Err`; they come back with
//! `is_error` set and a one-line explanation.

use parley_mesh::{ChatError, ChatService, ReadOutcome};
use std::sync::Arc;

/// Displayable result of one tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResponse {
    pub text: String,
    pub is_error: bool,
}

impl ToolResponse {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

impl From<ChatError> for ToolResponse {
    fn from(err: ChatError) -> Self {
        Self::error(format!("Error: {}", err.user_message()))
    }
}

/// The five chat operations over a shared [`ChatService`]
#[derive(Clone)]
pub struct ChatTools {
    service: Arc<ChatService>,
}

impl ChatTools {
    pub fn new(service: Arc<ChatService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ChatService {
        &self.service
    }

    pub async fn set_handle(&self, handle: &str) -> ToolResponse {
        match self.service.set_handle(handle).await {
            Ok(handle) => ToolResponse::ok(format!(
                "Handle set to: {handle}\nYou can now send messages to channels!"
            )),
            Err(err) => err.into(),
        }
    }

    pub async fn get_handle(&self) -> ToolResponse {
        match self.service.handle().await {
            Some(handle) => ToolResponse::ok(format!("Your current handle: {handle}")),
            None => ToolResponse::ok(
                "No handle set. Use set_handle tool to choose your agent handle.",
            ),
        }
    }

    pub fn list_channels(&self) -> ToolResponse {
        let lines: Vec<String> = self
            .service
            .list_channels()
            .iter()
            .map(|c| format!("- **{}**: {}", c.name, c.description))
            .collect();
        ToolResponse::ok(format!("Available channels:\n{}", lines.join("\n")))
    }

    pub async fn send_message(&self, channel: &str, message: &str) -> ToolResponse {
        match self.service.send_message(channel, message).await {
            Ok(receipt) => ToolResponse::ok(receipt.confirmation()),
            Err(err) => err.into(),
        }
    }

    /// `limit` of `None` uses the configured default
    pub async fn read_messages(&self, channel: &str, limit: Option<usize>) -> ToolResponse {
        match self.service.read_messages(channel, limit).await {
            Ok(outcome) => ToolResponse::ok(render_read(channel, &outcome)),
            Err(err) => err.into(),
        }
    }
}

fn render_read(channel: &str, outcome: &ReadOutcome) -> String {
    let mut text = match outcome {
        ReadOutcome::Empty { .. } => format!("No messages in #{channel} yet."),
        ReadOutcome::Messages(batch) => {
            let lines: Vec<String> = batch.messages.iter().map(ToString::to_string).collect();
            format!("Messages from #{channel}:\n\n{}", lines.join("\n"))
        }
    };

    match outcome.skipped() {
        0 => {}
        1 => text.push_str("\n\n(1 unreadable message skipped)"),
        n => text.push_str(&format!("\n\n({n} unreadable messages skipped)")),
    }
    text
}
