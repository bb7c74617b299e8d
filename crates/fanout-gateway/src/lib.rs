//! mcp-fanout gateway
//!
//! Runtime of the proxy:
//! - Backend connections over stdio, streamable HTTP and legacy SSE
//! - Registry of live connections and routing entries
//! - Configuration polling and incremental reconciliation
//! - Broadcast aggregation and identifier routing
//! - Outward MCP endpoints (stdio, streamable HTTP)

pub mod config;
pub mod mcp;
pub mod pool;
pub mod server;
pub mod services;

pub use config::{ConfigError, EndpointConfig, ProxyConfig};

pub use pool::{
    // Connections
    BackendClient, BackendConnection, BackendConnector, Connector, McpBackendClient,
    McpClient, McpClientHandler,
    // Transports
    ResolvedTransport, Transport, TransportConnectResult, TransportFactory, TransportType,
    // Registry and routing
    Aggregator, ConnectSummary, ReconcileSummary, Reconciler, Registry,
};

pub use services::ConfigSource;

pub use mcp::FanoutHandler;

pub use server::{FanoutProxy, HttpEndpoint, OutwardEndpoint, ProxyHandle, StdioEndpoint};
