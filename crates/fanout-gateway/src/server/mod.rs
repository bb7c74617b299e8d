//! Proxy server
//!
//! `endpoint` exposes the handler to the outward client (stdio or
//! streamable HTTP); `startup` wires configuration, backends and endpoint
//! into a running proxy and owns its teardown.

mod endpoint;
mod startup;

pub use endpoint::{HttpEndpoint, OutwardEndpoint, StdioEndpoint, MCP_PATH};
pub use startup::{FanoutProxy, ProxyHandle};
