//! Outward MCP handler
//!
//! Implements rmcp's `ServerHandler` on top of the [`Aggregator`]: the four
//! list operations broadcast, the three follow-up operations route. The
//! initialize response carries the proxy's own identity, never a backend's.

use std::sync::Arc;

use fanout_core::category::methods;
use fanout_core::{branding, ProxyError};
use rmcp::{
    model::*,
    service::RequestContext,
    ErrorData as McpError, RoleServer, ServerHandler,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::pool::Aggregator;

#[derive(Clone)]
pub struct FanoutHandler {
    aggregator: Arc<Aggregator>,
}

impl FanoutHandler {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }

    /// Broadcast `method` and decode the merged items. Items that do not
    /// decode are dropped rather than failing the whole listing.
    async fn list<T: DeserializeOwned>(&self, method: &str, field: &str) -> Vec<T> {
        let mut body = self.aggregator.broadcast(method, Value::Object(Default::default())).await;
        let items = match body.get_mut(field).map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        };

        let decoded: Vec<T> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(method, error = %e, "Dropping malformed item");
                    None
                }
            })
            .collect();
        debug!(method, count = decoded.len(), "Aggregated listing");
        decoded
    }

    async fn route<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<R, McpError> {
        let params = serde_json::to_value(params)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let result = self
            .aggregator
            .route(method, params)
            .await
            .map_err(to_mcp_error)?;
        serde_json::from_value(result).map_err(|e| {
            McpError::internal_error(format!("Backend returned an invalid result: {}", e), None)
        })
    }
}

fn to_mcp_error(error: ProxyError) -> McpError {
    match error {
        ProxyError::RoutingNotFound { .. } => McpError::invalid_params(error.to_string(), None),
        other => McpError::internal_error(other.to_string(), None),
    }
}

impl ServerHandler for FanoutHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: branding::PRODUCT_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some(branding::DISPLAY_NAME.to_string()),
                ..Default::default()
            },
            instructions: Some(
                "Aggregates tools, prompts and resources from several MCP servers. \
                 Item descriptions are prefixed with the originating server."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools: Vec<Tool> = self.list(methods::LIST_TOOLS, "tools").await;
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.route(methods::CALL_TOOL, &params).await
    }

    async fn list_prompts(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let prompts: Vec<Prompt> = self.list(methods::LIST_PROMPTS, "prompts").await;
        Ok(ListPromptsResult::with_all_items(prompts))
    }

    async fn get_prompt(
        &self,
        params: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        self.route(methods::GET_PROMPT, &params).await
    }

    async fn list_resources(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources: Vec<Resource> = self.list(methods::LIST_RESOURCES, "resources").await;
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn list_resource_templates(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let templates: Vec<ResourceTemplate> = self
            .list(methods::LIST_RESOURCE_TEMPLATES, "resourceTemplates")
            .await;
        Ok(ListResourceTemplatesResult::with_all_items(templates))
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        self.route(methods::READ_RESOURCE, &params).await
    }
}
