//! Centralized branding constants
//!
//! All product naming comes from this module, including the environment
//! variables the binary reads at startup.

/// Machine name reported in the initialize handshake and client info
pub const PRODUCT_NAME: &str = "mcp-fanout";

/// Human readable name
pub const DISPLAY_NAME: &str = "MCP Fanout";

/// Prefix for log file names (`mcp-fanout.2026-01-22.log`)
pub const LOG_PREFIX: &str = "mcp-fanout";

/// Envelope key that wraps the backend mapping in fetched configuration
pub const DEFAULT_NAMESPACE: &str = "mcp";

/// Environment variable names
pub mod env {
    pub const CONFIG_URL: &str = "MCP_FANOUT_CONFIG_URL";
    pub const CONFIG_HEADERS: &str = "MCP_FANOUT_CONFIG_HEADERS";
    pub const POLL_INTERVAL_MS: &str = "MCP_FANOUT_POLL_INTERVAL_MS";
    pub const NAMESPACE: &str = "MCP_FANOUT_NAMESPACE";
    pub const LOG_PATH: &str = "MCP_FANOUT_LOG_PATH";
    pub const ENDPOINT: &str = "MCP_FANOUT_ENDPOINT";
    pub const ANNOTATE_ORIGIN: &str = "MCP_FANOUT_ANNOTATE_ORIGIN";
    pub const CONNECT_TIMEOUT_MS: &str = "MCP_FANOUT_CONNECT_TIMEOUT_MS";
    pub const REQUEST_TIMEOUT_MS: &str = "MCP_FANOUT_REQUEST_TIMEOUT_MS";
}

/// Client name used when talking to a backend (`mcp-fanout-github`)
pub fn client_name(backend: &str) -> String {
    format!("{}-{}", PRODUCT_NAME, backend)
}
