//! Streamable HTTP transport for remote backends
//!
//! Descriptor headers are applied as default headers on the underlying
//! reqwest client, so every request of the session carries them.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;
use tracing::{debug, info, warn};

use super::{build_http_client, create_client_handler, Transport, TransportConnectResult, TransportType};

pub struct HttpTransport {
    url: String,
    headers: BTreeMap<String, String>,
    backend: String,
    connect_timeout: Duration,
}

impl HttpTransport {
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
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> TransportConnectResult {
        info!(backend = %self.backend, url = %self.url, "Connecting to HTTP backend");

        if let Err(e) = url::Url::parse(&self.url) {
            return TransportConnectResult::Failed(format!("Invalid URL: {}", e));
        }

        if !self.headers.is_empty() {
            debug!(
                backend = %self.backend,
                header_count = self.headers.len(),
                "Applying descriptor headers to connection"
            );
        }

        let client = match build_http_client(&self.headers) {
            Ok(c) => c,
            Err(err) => return TransportConnectResult::Failed(err),
        };

        let transport_config = StreamableHttpClientTransportConfig::with_uri(self.url.as_str());
        let transport = StreamableHttpClientTransport::with_client(client, transport_config);
        let client_handler = create_client_handler(&self.backend);

        let connect_future = client_handler.serve(transport);
        match tokio::time::timeout(self.connect_timeout, connect_future).await {
            Ok(Ok(client)) => {
                info!(backend = %self.backend, "HTTP backend connected");
                TransportConnectResult::Connected(client)
            }
            Ok(Err(e)) => {
                // Not fatal on its own: the SSE transport is tried next.
                let err = format!("HTTP connection failed: {}", e);
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
        TransportType::StreamableHttp
    }

    fn description(&self) -> String {
        format!("http:{}", self.url)
    }
}
