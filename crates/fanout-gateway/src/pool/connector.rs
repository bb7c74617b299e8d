//! Backend connector
//!
//! Turns a descriptor into a live [`BackendConnection`]. One attempt walks
//! the transport chain for the descriptor; attempts are retried with the
//! configured backoff. A backend that never connects yields `None` and is
//! left out of the registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanout_core::{BackendDescriptor, RetryPolicy};
use tracing::{info, warn};

use super::client::{BackendConnection, McpBackendClient};
use super::transport::{ResolvedTransport, TransportConnectResult, TransportFactory};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Establishes backend connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect `name`; `None` when every attempt failed.
    async fn connect(&self, name: &str, descriptor: &BackendDescriptor)
        -> Option<Arc<BackendConnection>>;
}

/// Production connector over stdio, streamable HTTP and SSE
pub struct BackendConnector {
    retry: RetryPolicy,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Default for BackendConnector {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl BackendConnector {
    pub fn new(retry: RetryPolicy, connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            retry,
            connect_timeout,
            request_timeout,
        }
    }

    /// Try each transport of the chain in order; the first handshake wins.
    async fn attempt(&self, name: &str, resolved: &ResolvedTransport) -> Result<BackendConnection, String> {
        let chain = TransportFactory::create(resolved, name, self.connect_timeout);
        let mut failures = Vec::with_capacity(chain.len());

        for transport in chain {
            match transport.connect().await {
                TransportConnectResult::Connected(client) => {
                    info!(
                        backend = %name,
                        transport = %transport.transport_type(),
                        target = %transport.description(),
                        "Backend connected"
                    );
                    let client = McpBackendClient::new(name, client, self.request_timeout);
                    return Ok(BackendConnection::new(name, Arc::new(client)));
                }
                TransportConnectResult::Failed(err) => {
                    failures.push(format!("{}: {}", transport.transport_type(), err));
                }
            }
        }

        Err(failures.join("; "))
    }
}

#[async_trait]
impl Connector for BackendConnector {
    async fn connect(
        &self,
        name: &str,
        descriptor: &BackendDescriptor,
    ) -> Option<Arc<BackendConnection>> {
        let resolved = match ResolvedTransport::from_descriptor(descriptor) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(backend = %name, "No usable transport: {}", err);
                return None;
            }
        };

        let label = format!("connect {}", name);
        let resolved = &resolved;
        let connection = self
            .retry
            .run(&label, |_attempt| self.attempt(name, resolved))
            .await;

        if connection.is_none() {
            warn!(
                backend = %name,
                attempts = self.retry.max_attempts(),
                "Backend unreachable, leaving it out"
            );
        }
        connection.map(Arc::new)
    }
}
