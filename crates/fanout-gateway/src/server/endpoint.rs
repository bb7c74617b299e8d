//! Outward endpoints
//!
//! An endpoint exposes the [`FanoutHandler`] to the outward client. Binding
//! returns once the endpoint accepts traffic; sessions run on background
//! tasks. When the outward peer goes away on its own, the endpoint cancels
//! the `stopped` token it was bound with.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::ServiceExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mcp::FanoutHandler;

/// Path the streamable HTTP endpoint is mounted on
pub const MCP_PATH: &str = "/mcp";

const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[async_trait]
pub trait OutwardEndpoint: Send + Sync {
    /// Start serving `handler`.
    async fn bind(&mut self, handler: FanoutHandler, stopped: CancellationToken)
        -> anyhow::Result<()>;

    /// Stop serving. Only called once, after a successful bind.
    async fn close(&mut self) -> anyhow::Result<()>;

    fn description(&self) -> String;
}

/// Cancel the task's token, then give it a grace period before aborting.
async fn stop_task(cancel: &CancellationToken, task: Option<JoinHandle<()>>, name: &str) {
    cancel.cancel();
    let Some(mut task) = task else {
        return;
    };
    match tokio::time::timeout(CLOSE_GRACE, &mut task).await {
        Ok(Ok(())) => debug!(endpoint = name, "Endpoint task finished"),
        Ok(Err(e)) => warn!(endpoint = name, error = %e, "Endpoint task failed"),
        Err(_) => {
            warn!(endpoint = name, "Endpoint did not stop in time, aborting");
            task.abort();
        }
    }
}

/// One session over the process's stdin/stdout
#[derive(Default)]
pub struct StdioEndpoint {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StdioEndpoint {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutwardEndpoint for StdioEndpoint {
    async fn bind(
        &mut self,
        handler: FanoutHandler,
        stopped: CancellationToken,
    ) -> anyhow::Result<()> {
        let cancel = self.cancel.clone();

        self.task = Some(tokio::spawn(async move {
            let session = async move {
                let service = handler
                    .serve(rmcp::transport::stdio())
                    .await
                    .context("Stdio client failed to initialize")?;
                info!("Stdio client initialized");
                let reason = service
                    .waiting()
                    .await
                    .context("Stdio session task failed")?;
                debug!(?reason, "Stdio session ended");
                anyhow::Ok(())
            };

            tokio::select! {
                _ = cancel.cancelled() => debug!("Stdio endpoint closing"),
                result = session => {
                    match result {
                        Ok(()) => info!("Stdio client disconnected"),
                        Err(e) => error!(error = %e, "Stdio session failed"),
                    }
                    stopped.cancel();
                }
            }
        }));

        info!("Serving MCP over stdio");
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        stop_task(&self.cancel, self.task.take(), "stdio").await;
        Ok(())
    }

    fn description(&self) -> String {
        "stdio".to_string()
    }
}

/// Streamable HTTP server (stateful sessions) mounted at [`MCP_PATH`]
pub struct HttpEndpoint {
    addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HttpEndpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            local_addr: None,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Address actually bound; differs from the requested one for port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Base URL of the MCP endpoint once bound
    pub fn url(&self) -> Option<String> {
        self.local_addr
            .map(|addr| format!("http://{}{}", addr, MCP_PATH))
    }
}

#[async_trait]
impl OutwardEndpoint for HttpEndpoint {
    async fn bind(
        &mut self,
        handler: FanoutHandler,
        stopped: CancellationToken,
    ) -> anyhow::Result<()> {
        let mcp_service = StreamableHttpService::new(
            move || Ok(handler.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                stateful_mode: true,
                cancellation_token: self.cancel.child_token(),
                ..Default::default()
            },
        );
        let router = axum::Router::new().nest_service(MCP_PATH, mcp_service);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.addr))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read bound address")?;
        self.local_addr = Some(local_addr);

        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(async move {
            let shutdown = async move { cancel.cancelled().await };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "HTTP endpoint stopped with error");
                stopped.cancel();
            }
        }));

        info!(url = %format!("http://{}{}", local_addr, MCP_PATH), "Serving MCP over streamable HTTP");
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        stop_task(&self.cancel, self.task.take(), "http").await;
        Ok(())
    }

    fn description(&self) -> String {
        match self.local_addr {
            Some(addr) => format!("http://{}{}", addr, MCP_PATH),
            None => format!("http://{}{}", self.addr, MCP_PATH),
        }
    }
}
