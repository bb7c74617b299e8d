//! Broadcast merging

use std::sync::Arc;
use std::time::Duration;

use fanout_core::category::methods;
use fanout_gateway::pool::{Aggregator, Registry};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tests::fixtures::{register, tool_list};
use tests::{MockBackendClient, MockReply};

fn names(body: &Value, field: &str, key: &str) -> Vec<String> {
    body[field]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item[key].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_failing_backend_contributes_nothing() {
    let registry = Arc::new(Registry::new());
    register(
        &registry,
        "b1",
        Arc::new(MockBackendClient::new().with_result(methods::LIST_TOOLS, tool_list(&["t1"]))),
    );
    register(
        &registry,
        "b2",
        Arc::new(MockBackendClient::new().with_reply(
            methods::LIST_TOOLS,
            MockReply::Protocol(-32603, "boom".to_string()),
        )),
    );
    register(
        &registry,
        "b3",
        Arc::new(
            MockBackendClient::new().with_result(methods::LIST_TOOLS, tool_list(&["t3a", "t3b"])),
        ),
    );
    let aggregator = Aggregator::new(registry);

    let body = aggregator.broadcast(methods::LIST_TOOLS, json!({})).await;

    assert_eq!(names(&body, "tools", "name"), vec!["t1", "t3a", "t3b"]);
}

#[tokio::test]
async fn test_unsupported_and_timeout_are_skipped() {
    let registry = Arc::new(Registry::new());
    register(&registry, "no-prompts", Arc::new(MockBackendClient::new()));
    register(
        &registry,
        "slow",
        Arc::new(MockBackendClient::new().with_reply(methods::LIST_PROMPTS, MockReply::Timeout)),
    );
    register(
        &registry,
        "prompts",
        Arc::new(MockBackendClient::new().with_result(
            methods::LIST_PROMPTS,
            json!({ "prompts": [{ "name": "summarize", "description": "Summarize text" }] }),
        )),
    );
    let aggregator = Aggregator::new(registry);

    let body = aggregator.broadcast(methods::LIST_PROMPTS, json!({})).await;

    assert_eq!(names(&body, "prompts", "name"), vec!["summarize"]);
}

#[tokio::test]
async fn test_no_backends_yields_empty_list() {
    let aggregator = Aggregator::new(Arc::new(Registry::new()));

    let body = aggregator.broadcast(methods::LIST_RESOURCES, json!({})).await;

    assert_eq!(body, json!({ "resources": [] }));
}

#[tokio::test]
async fn test_result_without_list_field_is_skipped() {
    let registry = Arc::new(Registry::new());
    register(
        &registry,
        "odd",
        Arc::new(MockBackendClient::new().with_result(methods::LIST_TOOLS, json!({ "tools": "x" }))),
    );
    register(
        &registry,
        "good",
        Arc::new(MockBackendClient::new().with_result(methods::LIST_TOOLS, tool_list(&["calc"]))),
    );
    let aggregator = Aggregator::new(registry);

    let body = aggregator.broadcast(methods::LIST_TOOLS, json!({})).await;

    assert_eq!(names(&body, "tools", "name"), vec!["calc"]);
}

#[tokio::test]
async fn test_origin_annotation() {
    let registry = Arc::new(Registry::new());
    register(
        &registry,
        "tools1",
        Arc::new(MockBackendClient::new().with_result(
            methods::LIST_TOOLS,
            json!({ "tools": [
                { "name": "calculator", "description": "Adds numbers" },
                { "name": "clock" }
            ] }),
        )),
    );
    register(
        &registry,
        "files",
        Arc::new(MockBackendClient::new().with_result(
            methods::LIST_RESOURCES,
            json!({ "resources": [{ "uri": "file:///a.txt", "name": "a.txt" }] }),
        )),
    );

    let annotated = Aggregator::new(registry.clone());
    let tools = annotated.broadcast(methods::LIST_TOOLS, json!({})).await;
    assert_eq!(tools["tools"][0]["description"], "[tools1] Adds numbers");
    assert_eq!(tools["tools"][1]["description"], "[tools1]");
    let resources = annotated.broadcast(methods::LIST_RESOURCES, json!({})).await;
    assert_eq!(resources["resources"][0]["name"], "[files] a.txt");

    let plain = Aggregator::new(registry).with_origin_annotation(false);
    let tools = plain.broadcast(methods::LIST_TOOLS, json!({})).await;
    assert_eq!(tools["tools"][0]["description"], "Adds numbers");
    assert!(tools["tools"][1].get("description").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_backends_are_queried_concurrently() {
    let registry = Arc::new(Registry::new());
    for name in ["a", "b", "c"] {
        register(
            &registry,
            name,
            Arc::new(
                MockBackendClient::new()
                    .with_delay(Duration::from_secs(10))
                    .with_result(methods::LIST_TOOLS, tool_list(&[name])),
            ),
        );
    }
    let aggregator = Aggregator::new(registry);

    let started = tokio::time::Instant::now();
    let body = aggregator.broadcast(methods::LIST_TOOLS, json!({})).await;

    assert_eq!(names(&body, "tools", "name"), vec!["a", "b", "c"]);
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[tokio::test]
async fn test_drain_waits_for_in_flight_calls() {
    let registry = Arc::new(Registry::new());
    register(
        &registry,
        "slow",
        Arc::new(
            MockBackendClient::new()
                .with_delay(Duration::from_millis(200))
                .with_result(methods::LIST_TOOLS, tool_list(&["t"])),
        ),
    );
    let aggregator = Arc::new(Aggregator::new(registry));

    let started = std::time::Instant::now();
    let call = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.broadcast(methods::LIST_TOOLS, json!({})).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    aggregator.drain().await;
    assert!(
        started.elapsed() >= Duration::from_millis(200),
        "drain returned while a call was in flight"
    );
    assert_eq!(names(&call.await.unwrap(), "tools", "name"), vec!["t"]);
}
