//! Client-side session handler for backend connections
//!
//! Every backend session is driven by one `McpClientHandler`. The proxy does
//! not cache backend capabilities, so list-changed notifications are only
//! logged; the next aggregated listing picks the change up.

use fanout_core::branding;
use rmcp::model::{ClientCapabilities, ClientInfo, Implementation, LoggingLevel};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::RoleClient;
use tracing::{debug, error, info, warn};

/// Type alias for the MCP client service
pub type McpClient = RunningService<RoleClient, McpClientHandler>;

/// Client handler for backend MCP connections
#[derive(Clone)]
pub struct McpClientHandler {
    info: ClientInfo,
    backend: String,
}

impl std::fmt::Debug for McpClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientHandler")
            .field("backend", &self.backend)
            .finish()
    }
}

impl McpClientHandler {
    pub fn new(backend: &str) -> Self {
        Self {
            info: ClientInfo {
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: branding::client_name(backend),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some(branding::DISPLAY_NAME.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            backend: backend.to_string(),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }
}

impl rmcp::ClientHandler for McpClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!(backend = %self.backend, "Backend sent tools/list_changed");
        }
    }

    fn on_prompt_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!(backend = %self.backend, "Backend sent prompts/list_changed");
        }
    }

    fn on_resource_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            info!(backend = %self.backend, "Backend sent resources/list_changed");
        }
    }

    fn on_logging_message(
        &self,
        params: rmcp::model::LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            let message = match &params.data {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let logger = params.logger.as_deref().unwrap_or("-");

            // Backend log levels are folded onto the proxy's own log stream.
            match params.level {
                LoggingLevel::Debug => {
                    debug!(backend = %self.backend, logger, "{}", message)
                }
                LoggingLevel::Info | LoggingLevel::Notice => {
                    info!(backend = %self.backend, logger, "{}", message)
                }
                LoggingLevel::Warning => {
                    warn!(backend = %self.backend, logger, "{}", message)
                }
                LoggingLevel::Error
                | LoggingLevel::Critical
                | LoggingLevel::Alert
                | LoggingLevel::Emergency => {
                    error!(backend = %self.backend, logger, "{}", message)
                }
            }
        }
    }
}
