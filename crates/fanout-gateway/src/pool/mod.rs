//! Backend pool
//!
//! - **transport**: stdio / streamable HTTP / SSE transports and their factory
//! - **BackendConnector**: descriptor → live connection, with retry
//! - **Registry**: live connections plus the routing table
//! - **Reconciler**: applies configuration snapshots to the registry
//! - **Aggregator**: broadcast and route over the registry

mod client;
mod connector;
mod instance;
mod reconciler;
mod registry;
mod routing;
pub mod transport;

pub use client::{BackendClient, BackendConnection, McpBackendClient};
pub use connector::{BackendConnector, Connector, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use instance::{McpClient, McpClientHandler};
pub use reconciler::{ConnectSummary, ReconcileSummary, Reconciler};
pub use registry::Registry;
pub use routing::Aggregator;
pub use transport::{ResolvedTransport, Transport, TransportConnectResult, TransportFactory, TransportType};
