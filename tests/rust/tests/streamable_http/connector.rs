//! Backend connector against real servers

use std::time::Duration;

use fanout_core::category::methods;
use fanout_core::{BackendDescriptor, RetryPolicy};
use fanout_gateway::pool::{BackendClient, BackendConnector, Connector};
use pretty_assertions::assert_eq;
use serde_json::json;

use super::backend_server::{start_backend, CalculatorServer};

fn connector() -> BackendConnector {
    BackendConnector::new(
        RetryPolicy::no_retry(),
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connect_list_and_call_over_streamable_http() {
    let server = CalculatorServer::new("");
    let (url, ct) = start_backend(server.clone()).await;

    let connection = connector()
        .connect("calc", &BackendDescriptor::http(url))
        .await
        .expect("backend should connect");
    assert_eq!(connection.name, "calc");

    let tools = connection
        .client
        .request(methods::LIST_TOOLS, json!({}))
        .await
        .unwrap();
    assert_eq!(tools["tools"][0]["name"], "add");

    let result = connection
        .client
        .request(
            methods::CALL_TOOL,
            json!({ "name": "add", "arguments": { "a": 2, "b": 3 } }),
        )
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "5");
    assert_eq!(server.call_count(), 1);

    let resource = connection
        .client
        .request(methods::READ_RESOURCE, json!({ "uri": "memo://readme" }))
        .await
        .unwrap();
    assert_eq!(resource["contents"][0]["uri"], "memo://readme");

    connection.client.close().await.unwrap();
    ct.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_backend_without_prompts_lists_none() {
    let (url, ct) = start_backend(CalculatorServer::new("")).await;
    let connection = connector()
        .connect("calc", &BackendDescriptor::http(url))
        .await
        .unwrap();

    // Either an empty listing or a failure the aggregator skips
    match connection.client.request(methods::LIST_PROMPTS, json!({})).await {
        Ok(result) => assert_eq!(result, json!({ "prompts": [] })),
        Err(e) => assert!(
            e.is_degradable() || matches!(e, fanout_core::BackendError::Protocol { .. }),
            "unexpected failure: {}",
            e
        ),
    }

    connection.client.close().await.unwrap();
    ct.cancel();
}

#[tokio::test]
async fn test_unreachable_url_gives_up() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connection = connector()
        .connect("gone", &BackendDescriptor::http(format!("http://{}/mcp", addr)))
        .await;

    assert!(connection.is_none());
}

#[tokio::test]
async fn test_missing_command_gives_up() {
    let connection = connector()
        .connect(
            "ghost",
            &BackendDescriptor::stdio("nonexistent_command_that_does_not_exist_abc123", vec![]),
        )
        .await;

    assert!(connection.is_none());
}

#[tokio::test]
async fn test_descriptor_without_transport_is_not_attempted() {
    let connection = connector()
        .connect("empty", &BackendDescriptor::default())
        .await;

    assert!(connection.is_none());
}
