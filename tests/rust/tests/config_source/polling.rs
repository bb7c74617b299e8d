//! Snapshot stream behaviour while polling

use std::time::Duration;

use fanout_core::ProxyError;
use fanout_gateway::services::ConfigSource;
use futures::StreamExt;
use tests::async_helpers::{with_timeout, DEFAULT_TIMEOUT};
use tests::fixtures::config_response;
use tests::log_capture::capture_warnings;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POLL: Duration = Duration::from_millis(20);

/// Mount `template` for the next `times` requests
async fn respond(server: &MockServer, template: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(template)
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Mount `template` for every remaining request
async fn respond_always(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(template)
        .mount(server)
        .await;
}

fn source_for(server: &MockServer) -> ConfigSource {
    ConfigSource::new(Some(format!("{}/config", server.uri()))).with_poll_interval(Some(POLL))
}

#[tokio::test]
async fn test_first_fetch_error_ends_stream() {
    let server = MockServer::start().await;
    respond_always(&server, ResponseTemplate::new(401)).await;

    let stream = source_for(&server).snapshots(CancellationToken::new());
    let mut stream = Box::pin(stream);

    let first = with_timeout(DEFAULT_TIMEOUT, stream.next()).await;
    assert!(matches!(first, Some(Err(ProxyError::Authentication { .. }))));
    assert!(with_timeout(DEFAULT_TIMEOUT, stream.next()).await.is_none());
}

#[tokio::test]
async fn test_unchanged_snapshots_are_not_emitted_again() {
    let server = MockServer::start().await;
    respond_always(&server, config_response(&["a", "b"])).await;

    let mut stream = Box::pin(source_for(&server).snapshots(CancellationToken::new()));

    let first = with_timeout(DEFAULT_TIMEOUT, stream.next()).await;
    assert_eq!(first.unwrap().unwrap().len(), 2);

    // Several polls happen in this window, none of them a change
    let next = tokio::time::timeout(POLL * 15, stream.next()).await;
    assert!(next.is_err(), "unchanged configuration must not be emitted");
    assert!(server.received_requests().await.unwrap().len() > 2);
}

#[tokio::test]
async fn test_changed_snapshot_is_emitted() {
    let server = MockServer::start().await;
    respond(&server, config_response(&["a"]), 2).await;
    respond_always(&server, config_response(&["a", "b"])).await;

    let mut stream = Box::pin(source_for(&server).snapshots(CancellationToken::new()));

    let first = with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();
    assert_eq!(first.names().collect::<Vec<_>>(), vec!["a"]);

    let second = with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();
    assert_eq!(second.names().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_reordered_entries_count_as_a_change() {
    let server = MockServer::start().await;
    respond(&server, config_response(&["a", "b"]), 1).await;
    respond_always(&server, config_response(&["b", "a"])).await;

    let mut stream = Box::pin(source_for(&server).snapshots(CancellationToken::new()));

    with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();
    let second = with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();
    assert_eq!(second.names().collect::<Vec<_>>(), vec!["b", "a"]);
}

#[tokio::test]
async fn test_malformed_poll_is_skipped_and_polling_continues() {
    let server = MockServer::start().await;
    respond(&server, config_response(&["a"]), 4).await;
    respond(&server, ResponseTemplate::new(200).set_body_string("<html>"), 2).await;
    respond_always(&server, config_response(&["a", "c"])).await;

    let mut stream = Box::pin(source_for(&server).snapshots(CancellationToken::new()));

    let first = with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();
    assert_eq!(first.len(), 1);

    // The malformed bodies are swallowed; the next item is the real change
    let next = with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();
    assert_eq!(next.names().collect::<Vec<_>>(), vec!["a", "c"]);
}

#[tokio::test]
async fn test_unreachable_poll_yields_empty_snapshot() {
    let server = MockServer::start().await;
    respond(&server, config_response(&["a"]), 1).await;
    respond_always(&server, ResponseTemplate::new(500)).await;

    let mut stream = Box::pin(source_for(&server).snapshots(CancellationToken::new()));

    with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();
    let next = with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();
    assert!(next.is_empty());
}

#[tokio::test]
async fn test_auth_failure_while_polling_ends_stream() {
    let server = MockServer::start().await;
    respond(&server, config_response(&["a"]), 1).await;
    respond_always(&server, ResponseTemplate::new(401)).await;

    let mut stream = Box::pin(source_for(&server).snapshots(CancellationToken::new()));

    with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();
    let failure = with_timeout(DEFAULT_TIMEOUT, stream.next()).await;
    assert!(matches!(failure, Some(Err(ProxyError::Authentication { .. }))));
    assert!(with_timeout(DEFAULT_TIMEOUT, stream.next()).await.is_none());
}

#[tokio::test]
async fn test_cancel_ends_stream() {
    let server = MockServer::start().await;
    respond_always(&server, config_response(&["a"])).await;
    let cancel = CancellationToken::new();

    let mut stream = Box::pin(source_for(&server).snapshots(cancel.clone()));
    with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();

    cancel.cancel();
    assert!(with_timeout(DEFAULT_TIMEOUT, stream.next()).await.is_none());
}

#[tokio::test]
async fn test_disabled_polling_yields_only_the_first_snapshot() {
    let server = MockServer::start().await;
    respond_always(&server, config_response(&["a"])).await;

    let source = source_for(&server).with_poll_interval(None);
    let mut stream = Box::pin(source.snapshots(CancellationToken::new()));

    with_timeout(DEFAULT_TIMEOUT, stream.next()).await.unwrap().unwrap();
    assert!(with_timeout(DEFAULT_TIMEOUT, stream.next()).await.is_none());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_during_slow_fetch_logs_no_failure() {
    let server = MockServer::start().await;
    respond(&server, config_response(&["a"]), 1).await;
    respond_always(
        &server,
        ResponseTemplate::new(500).set_delay(Duration::from_millis(300)),
    )
    .await;

    let (warnings, _guard) = capture_warnings();
    let cancel = CancellationToken::new();
    let mut stream = Box::pin(source_for(&server).snapshots(cancel.clone()));

    let first = with_timeout(DEFAULT_TIMEOUT, stream.next()).await;
    assert_eq!(first.unwrap().unwrap().len(), 1);

    // Cancel while the next poll waits on the slow endpoint
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    assert!(with_timeout(DEFAULT_TIMEOUT, stream.next()).await.is_none());

    // Outlast the delayed 500 so a late failure would have been logged
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(
        warnings.is_empty(),
        "unexpected warnings: {:?}",
        warnings.messages()
    );
}

#[tokio::test]
async fn test_failure_while_polling_is_still_logged() {
    let server = MockServer::start().await;
    respond(&server, config_response(&["a"]), 1).await;
    respond_always(&server, ResponseTemplate::new(500)).await;

    let (warnings, _guard) = capture_warnings();
    let cancel = CancellationToken::new();
    let mut stream = Box::pin(source_for(&server).snapshots(cancel.clone()));

    with_timeout(DEFAULT_TIMEOUT, stream.next()).await;
    let emptied = with_timeout(DEFAULT_TIMEOUT, stream.next()).await;
    assert!(emptied.unwrap().unwrap().is_empty());
    assert!(warnings
        .messages()
        .iter()
        .any(|message| message.contains("using empty configuration")));

    cancel.cancel();
}
