//! Tool responses as an MCP client would see them

use parley_mcp::{ChatTools, ToolResponse};
use parley_mesh::{ChatConfig, ChatService, InMemoryBroker};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

fn tools() -> (InMemoryBroker, ChatTools) {
    let broker = InMemoryBroker::new();
    let config = ChatConfig::builder()
        .broker_url("mem://local")
        .fetch_timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let service = ChatService::new(config, Arc::new(broker.clone()));
    (broker, ChatTools::new(Arc::new(service)))
}

#[tokio::test]
async fn test_handle_lifecycle() {
    let (_, tools) = tools();

    assert_eq!(
        tools.get_handle().await,
        ToolResponse::ok("No handle set. Use set_handle tool to choose your agent handle.")
    );
    assert_eq!(
        tools.set_handle("business-analyst").await,
        ToolResponse::ok("Handle set to: business-analyst\nYou can now send messages to channels!")
    );
    assert_eq!(
        tools.get_handle().await,
        ToolResponse::ok("Your current handle: business-analyst")
    );
}

#[tokio::test]
async fn test_blank_handle_is_error() {
    let (_, tools) = tools();
    let response = tools.set_handle("   ").await;
    assert!(response.is_error);
    assert!(response.text.starts_with("Error: Invalid handle"));
}

#[test]
fn test_list_channels_text() {
    let (broker, tools) = tools();
    let response = tools.list_channels();

    assert!(!response.is_error);
    assert_eq!(
        response.text,
        "Available channels:\n\
         - **roadmap**: Discussion about project roadmap and planning\n\
         - **parallel-work**: Coordination for parallel work among agents\n\
         - **errors**: Error reporting and troubleshooting"
    );
    assert_eq!(broker.connect_count(), 0);
}

#[tokio::test]
async fn test_send_and_read_texts() {
    let (_, tools) = tools();
    tools.set_handle("pm").await;

    let sent = tools.send_message("roadmap", "kickoff").await;
    assert_eq!(sent, ToolResponse::ok("Message sent to #roadmap by pm"));

    let read = tools.read_messages("roadmap", Some(10)).await;
    assert!(!read.is_error);
    let lines: Vec<&str> = read.text.lines().collect();
    assert_eq!(lines[0], "Messages from #roadmap:");
    assert_eq!(lines[1], "");
    assert_eq!(lines.len(), 3);
    assert!(lines[2].starts_with('[') && lines[2].ends_with("] pm: kickoff"));

    let again = tools.read_messages("roadmap", Some(10)).await;
    assert_eq!(again, ToolResponse::ok("No messages in #roadmap yet."));
}

#[tokio::test]
async fn test_send_without_handle() {
    let (broker, tools) = tools();
    let response = tools.send_message("errors", "boom").await;

    assert_eq!(
        response,
        ToolResponse::error("Error: You must set a handle first using set_handle tool.")
    );
    assert_eq!(broker.publish_count(), 0);
}

#[rstest]
#[case(Some(0))]
#[case(Some(100_000))]
#[tokio::test]
async fn test_out_of_range_limit(#[case] limit: Option<usize>) {
    let (broker, tools) = tools();
    let response = tools.read_messages("errors", limit).await;

    assert!(response.is_error);
    assert!(response.text.starts_with("Error: Invalid limit"));
    assert_eq!(broker.fetch_count(), 0);
}

#[tokio::test]
async fn test_unknown_channel_text() {
    let (_, tools) = tools();
    tools.set_handle("pm").await;

    assert_eq!(
        tools.send_message("general", "hi").await,
        ToolResponse::error("Error: Invalid channel: general")
    );
    assert_eq!(
        tools.read_messages("general", None).await,
        ToolResponse::error("Error: Invalid channel: general")
    );
}

#[tokio::test]
async fn test_broker_down_is_error_text_then_recovers() {
    let (broker, tools) = tools();
    broker.set_reachable(false);
    tools.set_handle("pm").await;

    let response = tools.send_message("roadmap", "hello").await;
    assert!(response.is_error);
    assert!(response.text.starts_with("Error: Message broker connection failed"));

    broker.set_reachable(true);
    assert!(!tools.send_message("roadmap", "hello").await.is_error);
}
