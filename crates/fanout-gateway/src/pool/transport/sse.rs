//! Legacy HTTP+SSE transport
//!
//! Older servers expose a long-lived `GET` event stream. The first event is
//! `endpoint`, carrying the URL (relative to the stream URL) that accepts
//! client messages as `POST`s; server messages then arrive as `message`
//! events. The session is assembled from a channel sink, drained by a
//! posting task, and the decoded event stream.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::ServiceExt;
use tracing::{debug, info, warn};
use url::Url;

use super::{build_http_client, create_client_handler, Transport, TransportConnectResult, TransportType};

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental decoder for the `text/event-stream` format.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk and return every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(&['\n', '\r'][..]);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Decode a byte stream into events. Ends at the first transport error.
pub(crate) fn sse_events<S, B, E>(body: S) -> impl Stream<Item = SseEvent> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::default();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in decoder.feed(bytes.as_ref()) {
                        yield event;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Event stream ended with error");
                    break;
                }
            }
        }
    }
}

/// Forward outgoing client messages to the POST endpoint until the
/// session drops its sink.
async fn post_outgoing(
    client: reqwest::Client,
    endpoint: Url,
    mut outgoing: UnboundedReceiver<ClientJsonRpcMessage>,
    backend: String,
) {
    while let Some(message) = outgoing.next().await {
        let result = client
            .post(endpoint.clone())
            .json(&message)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        if let Err(e) = result {
            warn!(backend = %backend, error = %e, "Failed to post message to SSE endpoint");
        }
    }
    debug!(backend = %backend, "SSE sender closed");
}

pub struct SseTransport {
    url: String,
    headers: BTreeMap<String, String>,
    backend: String,
    connect_timeout: Duration,
}

impl SseTransport {
    pub fn new(
        url: String,
        headers: BTreeMap<String, String>,
        backend: String,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            url,
            headers,
            backend,
            connect_timeout,
        }
    }

    async fn open(&self) -> Result<TransportConnectResult, String> {
        let base = Url::parse(&self.url).map_err(|e| format!("Invalid URL: {}", e))?;
        let client = build_http_client(&self.headers)?;

        let response = client
            .get(base.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| format!("Failed to open event stream: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("Event stream returned {}", response.status()));
        }

        let mut events = Box::pin(sse_events(response.bytes_stream()));

        let endpoint = loop {
            match events.next().await {
                Some(event) if event.event == "endpoint" => {
                    break base
                        .join(event.data.trim())
                        .map_err(|e| format!("Invalid endpoint '{}': {}", event.data, e))?;
                }
                Some(event) => {
                    debug!(backend = %self.backend, event = %event.event, "Skipping event before endpoint");
                }
                None => return Err("Event stream closed before endpoint event".to_string()),
            }
        };
        debug!(backend = %self.backend, endpoint = %endpoint, "SSE endpoint announced");

        let (sink, outgoing) = unbounded::<ClientJsonRpcMessage>();
        tokio::spawn(post_outgoing(client, endpoint, outgoing, self.backend.clone()));

        let backend = self.backend.clone();
        let incoming = events.filter_map(move |event| {
            let backend = backend.clone();
            async move {
                if event.event != "message" {
                    return None;
                }
                match serde_json::from_str::<ServerJsonRpcMessage>(&event.data) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!(backend = %backend, error = %e, "Dropping undecodable SSE message");
                        None
                    }
                }
            }
        });

        let client_handler = create_client_handler(&self.backend);
        let client = client_handler
            .serve((sink, Box::pin(incoming)))
            .await
            .map_err(|e| format!("MCP handshake failed: {}", e))?;
        Ok(TransportConnectResult::Connected(client))
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn connect(&self) -> TransportConnectResult {
        info!(backend = %self.backend, url = %self.url, "Connecting to SSE backend");

        match tokio::time::timeout(self.connect_timeout, self.open()).await {
            Ok(Ok(result)) => {
                info!(backend = %self.backend, "SSE backend connected");
                result
            }
            Ok(Err(err)) => {
                warn!(backend = %self.backend, "{}", err);
                TransportConnectResult::Failed(err)
            }
            Err(_) => {
                let err = format!("Connection timeout ({:?})", self.connect_timeout);
                warn!(backend = %self.backend, "{}", err);
                TransportConnectResult::Failed(err)
            }
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Sse
    }

    fn description(&self) -> String {
        format!("sse:{}", self.url)
    }
}
