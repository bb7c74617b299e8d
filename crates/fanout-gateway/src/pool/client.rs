//! Backend clients
//!
//! [`BackendClient`] is the seam between routing and the wire: routing only
//! ever sends a method name plus JSON params and gets JSON back. The
//! production implementation drives an rmcp client session; tests
//! substitute scripted clients.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use fanout_core::category::methods;
use fanout_core::BackendError;
use rmcp::model::{
    CallToolRequestParams, ErrorCode, GetPromptRequestParams, ReadResourceRequestParams,
};
use rmcp::service::{Peer, ServiceError};
use rmcp::RoleClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::instance::McpClient;

/// Request/response access to one backend
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Issue `method` with `params`; the result is the protocol result body.
    async fn request(&self, method: &str, params: Value) -> Result<Value, BackendError>;

    /// Shut the session down. Calling it twice is harmless.
    async fn close(&self) -> anyhow::Result<()>;
}

/// A named, live backend connection as held by the registry
pub struct BackendConnection {
    pub name: String,
    pub client: Arc<dyn BackendClient>,
}

impl BackendConnection {
    pub fn new(name: impl Into<String>, client: Arc<dyn BackendClient>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnection")
            .field("name", &self.name)
            .finish()
    }
}

/// [`BackendClient`] backed by an rmcp client session
pub struct McpBackendClient {
    backend: String,
    peer: Peer<RoleClient>,
    service: parking_lot::Mutex<Option<McpClient>>,
    request_timeout: Duration,
}

impl McpBackendClient {
    pub fn new(backend: &str, client: McpClient, request_timeout: Duration) -> Self {
        Self {
            backend: backend.to_string(),
            peer: client.peer().clone(),
            service: parking_lot::Mutex::new(Some(client)),
            request_timeout,
        }
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, BackendError> {
        let peer = &self.peer;
        match method {
            methods::LIST_TOOLS => {
                let tools = peer.list_all_tools().await.map_err(map_service_error)?;
                items_result("tools", tools)
            }
            methods::LIST_PROMPTS => {
                let prompts = peer.list_all_prompts().await.map_err(map_service_error)?;
                items_result("prompts", prompts)
            }
            methods::LIST_RESOURCES => {
                let resources = peer.list_all_resources().await.map_err(map_service_error)?;
                items_result("resources", resources)
            }
            methods::LIST_RESOURCE_TEMPLATES => {
                let templates = peer
                    .list_all_resource_templates()
                    .await
                    .map_err(map_service_error)?;
                items_result("resourceTemplates", templates)
            }
            methods::CALL_TOOL => {
                let params: CallToolRequestParams = parse_params(method, params)?;
                let result = peer.call_tool(params).await.map_err(map_service_error)?;
                to_json(&result)
            }
            methods::GET_PROMPT => {
                let params: GetPromptRequestParams = parse_params(method, params)?;
                let result = peer.get_prompt(params).await.map_err(map_service_error)?;
                to_json(&result)
            }
            methods::READ_RESOURCE => {
                let params: ReadResourceRequestParams = parse_params(method, params)?;
                let result = peer.read_resource(params).await.map_err(map_service_error)?;
                to_json(&result)
            }
            other => Err(BackendError::Unsupported(other.to_string())),
        }
    }
}

#[async_trait]
impl BackendClient for McpBackendClient {
    async fn request(&self, method: &str, params: Value) -> Result<Value, BackendError> {
        debug!(backend = %self.backend, method, "Forwarding request");
        match tokio::time::timeout(self.request_timeout, self.dispatch(method, params)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.request_timeout)),
        }
    }

    async fn close(&self) -> anyhow::Result<()> {
        let service = self.service.lock().take();
        if let Some(service) = service {
            service
                .cancel()
                .await
                .with_context(|| format!("Failed to stop session for '{}'", self.backend))?;
            debug!(backend = %self.backend, "Session closed");
        }
        Ok(())
    }
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, BackendError> {
    serde_json::from_value(params).map_err(|e| BackendError::Protocol {
        code: ErrorCode::INVALID_PARAMS.0,
        message: format!("invalid params for {}: {}", method, e),
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, BackendError> {
    serde_json::to_value(value).map_err(|e| BackendError::Transport(e.to_string()))
}

fn items_result<T: Serialize>(field: &str, items: Vec<T>) -> Result<Value, BackendError> {
    let mut body = serde_json::Map::new();
    body.insert(field.to_string(), to_json(&items)?);
    Ok(Value::Object(body))
}

/// Classify an rmcp failure. Method-not-found means the backend lacks the
/// capability, which callers treat as "nothing to contribute".
pub(crate) fn map_service_error(error: ServiceError) -> BackendError {
    match error {
        ServiceError::McpError(data) if data.code == ErrorCode::METHOD_NOT_FOUND => {
            BackendError::Unsupported(data.message.to_string())
        }
        ServiceError::McpError(data) => BackendError::Protocol {
            code: data.code.0,
            message: data.message.to_string(),
        },
        ServiceError::Timeout { timeout } => BackendError::Timeout(timeout),
        ServiceError::TransportClosed => BackendError::Closed,
        other => BackendError::Transport(other.to_string()),
    }
}
