//! Start-up and live reconfiguration

use std::sync::Arc;
use std::time::Duration;

use fanout_core::category::methods;
use fanout_core::ProxyError;
use fanout_gateway::server::{FanoutProxy, ProxyHandle};
use fanout_gateway::services::ConfigSource;
use pretty_assertions::assert_eq;
use serde_json::json;
use tests::async_helpers::{with_timeout, DEFAULT_TIMEOUT};
use tests::fixtures::{config_response, tool_list};
use tests::{MockBackendClient, MockConnector, MockEndpoint};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POLL: Duration = Duration::from_millis(20);

async fn config_server(first: ResponseTemplate, first_times: Option<u64>) -> MockServer {
    let server = MockServer::start().await;
    let mock = Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(first);
    match first_times {
        Some(times) => mock.up_to_n_times(times).mount(&server).await,
        None => mock.mount(&server).await,
    }
    server
}

async fn then_serve(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(template)
        .mount(server)
        .await;
}

fn source_for(server: &MockServer) -> ConfigSource {
    ConfigSource::new(Some(format!("{}/config", server.uri()))).with_poll_interval(Some(POLL))
}

/// Poll `check` until it holds or the default timeout passes
async fn eventually(mut check: impl FnMut() -> bool) {
    with_timeout(DEFAULT_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

#[tokio::test]
async fn test_start_connects_backends_then_binds() {
    let server = config_server(config_response(&["a", "b", "c"]), None).await;
    let connector = Arc::new(MockConnector::new().with_failing("b"));
    let (endpoint, probe) = MockEndpoint::new();

    let handle = FanoutProxy::new(source_for(&server), connector.clone(), Box::new(endpoint))
        .start()
        .await
        .unwrap();

    assert_eq!(
        handle.registry().names(),
        vec!["a".to_string(), "c".to_string()]
    );
    assert_eq!(probe.binds(), 1);
    assert!(probe.handler().is_some());
    assert!(!handle.is_stopped());

    handle.dispose().await;
}

#[tokio::test]
async fn test_start_without_configuration_url_serves_nothing() {
    let (endpoint, probe) = MockEndpoint::new();

    let handle = FanoutProxy::new(
        ConfigSource::new(None).with_poll_interval(None),
        Arc::new(MockConnector::new()),
        Box::new(endpoint),
    )
    .start()
    .await
    .unwrap();

    assert!(handle.registry().is_empty());
    assert_eq!(probe.binds(), 1);
    let tools = handle
        .aggregator()
        .broadcast(methods::LIST_TOOLS, json!({}))
        .await;
    assert_eq!(tools, json!({ "tools": [] }));

    handle.dispose().await;
}

#[tokio::test]
async fn test_unauthorized_first_fetch_fails_start() {
    let server = config_server(ResponseTemplate::new(401), None).await;
    let connector = Arc::new(MockConnector::new());
    let (endpoint, probe) = MockEndpoint::new();

    let result = FanoutProxy::new(source_for(&server), connector.clone(), Box::new(endpoint))
        .start()
        .await;

    assert!(matches!(result, Err(ProxyError::Authentication { .. })));
    assert_eq!(probe.binds(), 0);
    assert_eq!(connector.total_attempts(), 0);
}

#[tokio::test]
async fn test_malformed_first_fetch_fails_start() {
    let server = config_server(ResponseTemplate::new(200).set_body_string("nope"), None).await;
    let (endpoint, probe) = MockEndpoint::new();

    let result = FanoutProxy::new(
        source_for(&server),
        Arc::new(MockConnector::new()),
        Box::new(endpoint),
    )
    .start()
    .await;

    assert!(matches!(result, Err(ProxyError::Configuration(_))));
    assert_eq!(probe.binds(), 0);
}

#[tokio::test]
async fn test_bind_failure_closes_connected_backends() {
    let server = config_server(config_response(&["a"]), None).await;
    let connector = Arc::new(MockConnector::new());
    let (endpoint, probe) = MockEndpoint::failing();

    let result = FanoutProxy::new(source_for(&server), connector.clone(), Box::new(endpoint))
        .start()
        .await;

    match result {
        Err(e @ ProxyError::Startup { .. }) => {
            assert!(e.is_fatal());
            assert!(e.to_string().contains("mock"));
        }
        Err(other) => panic!("expected startup error, got {:?}", other),
        Ok(_) => panic!("start should fail when the endpoint cannot bind"),
    }
    assert_eq!(probe.binds(), 1);
    assert_eq!(connector.client("a").close_count(), 1);
}

#[tokio::test]
async fn test_configuration_change_is_applied_while_running() {
    let server = config_server(config_response(&["a"]), Some(1)).await;
    then_serve(&server, config_response(&["a", "b"])).await;
    let connector = Arc::new(MockConnector::new());
    let (endpoint, _probe) = MockEndpoint::new();

    let handle = FanoutProxy::new(source_for(&server), connector.clone(), Box::new(endpoint))
        .start()
        .await
        .unwrap();
    let first = handle.registry().get_connection("a").unwrap();

    let registry = handle.registry().clone();
    eventually(|| registry.len() == 2).await;

    // The unchanged backend keeps its connection
    assert!(Arc::ptr_eq(
        &first,
        &handle.registry().get_connection("a").unwrap()
    ));
    assert_eq!(connector.attempts("a"), 1);

    handle.dispose().await;
}

#[tokio::test]
async fn test_new_backend_tools_become_routable() {
    let server = config_server(config_response(&["a"]), Some(1)).await;
    then_serve(&server, config_response(&["a", "tools1"])).await;
    let connector = Arc::new(
        MockConnector::new().with_client(
            "tools1",
            Arc::new(
                MockBackendClient::new()
                    .with_result(methods::LIST_TOOLS, tool_list(&["calculator"]))
                    .with_result(methods::CALL_TOOL, json!({ "content": [] })),
            ),
        ),
    );
    let (endpoint, _probe) = MockEndpoint::new();

    let handle: ProxyHandle =
        FanoutProxy::new(source_for(&server), connector.clone(), Box::new(endpoint))
            .start()
            .await
            .unwrap();
    let registry = handle.registry().clone();
    eventually(|| registry.len() == 2).await;

    let tools = handle
        .aggregator()
        .broadcast(methods::LIST_TOOLS, json!({}))
        .await;
    assert_eq!(tools["tools"][0]["name"], "calculator");
    handle
        .aggregator()
        .route(methods::CALL_TOOL, json!({ "name": "calculator" }))
        .await
        .unwrap();
    assert_eq!(connector.client("tools1").call_count(methods::CALL_TOOL), 1);

    handle.dispose().await;
}
