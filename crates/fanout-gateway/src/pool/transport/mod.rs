//! Transport abstraction for backend connections
//!
//! A descriptor resolves to a [`ResolvedTransport`], which the
//! [`TransportFactory`] turns into an ordered chain of [`Transport`]s.
//! The connector walks the chain and keeps the first one that completes
//! the handshake; HTTP backends try streamable HTTP first and fall back to
//! the legacy event-stream protocol.

mod http;
mod sse;
mod stdio;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use fanout_core::BackendDescriptor;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

use super::instance::{McpClient, McpClientHandler};

/// Variables a child process inherits even though its environment is cleared
#[cfg(unix)]
const INHERITED_ENV_VARS: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

#[cfg(windows)]
const INHERITED_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

#[cfg(not(any(unix, windows)))]
const INHERITED_ENV_VARS: &[&str] = &["PATH"];

/// Result of a transport connection attempt
pub enum TransportConnectResult {
    /// Handshake completed
    Connected(McpClient),
    /// Connection failed
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Stdio,
    StreamableHttp,
    Sse,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportType::Stdio => "stdio",
            TransportType::StreamableHttp => "streamable-http",
            TransportType::Sse => "sse",
        };
        f.write_str(name)
    }
}

/// Transport trait for backend connections
///
/// Each implementation handles the specifics of reaching a backend over
/// one protocol and performing the initialize handshake.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempt to connect and complete the handshake
    async fn connect(&self) -> TransportConnectResult;

    fn transport_type(&self) -> TransportType;

    /// Get a description for logging
    fn description(&self) -> String;
}

/// Runtime transport configuration derived from a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTransport {
    Stdio {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    },
    Http {
        url: String,
        headers: BTreeMap<String, String>,
    },
}

impl ResolvedTransport {
    /// Resolve a descriptor into a connectable configuration.
    ///
    /// `url` wins over `command`. A command with no `args` is split with
    /// shell quoting rules, so `"npx -y server"` works as a single string.
    /// The child environment is the inherited baseline overlaid with the
    /// descriptor's variables; `PATH` is always present.
    pub fn from_descriptor(descriptor: &BackendDescriptor) -> Result<Self, String> {
        if descriptor.is_http() {
            let url = descriptor.url.clone().unwrap_or_default();
            return Ok(ResolvedTransport::Http {
                url: url.trim().to_string(),
                headers: descriptor.headers.clone(),
            });
        }

        if !descriptor.is_stdio() {
            return Err("descriptor has neither a url nor a command".to_string());
        }

        let raw_command = descriptor.command.as_deref().unwrap_or_default().trim();
        let (command, args) = if descriptor.args.is_empty() {
            parse_command(raw_command)?
        } else {
            (raw_command.to_string(), descriptor.args.clone())
        };

        Ok(ResolvedTransport::Stdio {
            command,
            args,
            env: child_environment(&descriptor.env),
        })
    }

    pub fn transport_type(&self) -> TransportType {
        match self {
            ResolvedTransport::Stdio { .. } => TransportType::Stdio,
            ResolvedTransport::Http { .. } => TransportType::StreamableHttp,
        }
    }

    /// Get URL for HTTP transports
    pub fn url(&self) -> Option<&str> {
        match self {
            ResolvedTransport::Http { url, .. } => Some(url),
            ResolvedTransport::Stdio { .. } => None,
        }
    }
}

/// Split a command string into program and arguments.
fn parse_command(command: &str) -> Result<(String, Vec<String>), String> {
    let mut parts = shell_words::split(command)
        .map_err(|e| format!("Failed to parse command '{}': {}", command, e))?;
    if parts.is_empty() {
        return Err("command is empty".to_string());
    }
    let program = parts.remove(0);
    Ok((program, parts))
}

/// Build the environment handed to a child process.
fn child_environment(declared: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = INHERITED_ENV_VARS
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
        .collect();
    env.extend(declared.iter().map(|(k, v)| (k.clone(), v.clone())));
    if !env.contains_key("PATH") {
        env.insert("PATH".to_string(), std::env::var("PATH").unwrap_or_default());
    }
    env
}

/// Build a reqwest HeaderMap from descriptor-provided headers.
pub fn build_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, String> {
    let mut header_map = HeaderMap::new();
    for (key, value) in headers {
        let header_name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| format!("Invalid header name '{}': {}", key, e))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| format!("Invalid header value for '{}': {}", key, e))?;
        header_map.insert(header_name, header_value);
    }
    Ok(header_map)
}

/// Build a reqwest::Client that sends the given headers on every request.
pub(crate) fn build_http_client(headers: &BTreeMap<String, String>) -> Result<reqwest::Client, String> {
    let header_map = build_header_map(headers)?;
    reqwest::Client::builder()
        .default_headers(header_map)
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {}", e))
}

/// Factory for creating transport chains
pub struct TransportFactory;

impl TransportFactory {
    /// Create the ordered transports to try for a resolved configuration
    pub fn create(
        config: &ResolvedTransport,
        backend: &str,
        connect_timeout: Duration,
    ) -> Vec<Box<dyn Transport>> {
        match config {
            ResolvedTransport::Stdio { command, args, env } => vec![Box::new(StdioTransport::new(
                command.clone(),
                args.clone(),
                env.clone(),
                backend.to_string(),
                connect_timeout,
            )) as Box<dyn Transport>],
            ResolvedTransport::Http { url, headers } => vec![
                Box::new(HttpTransport::new(
                    url.clone(),
                    headers.clone(),
                    backend.to_string(),
                    connect_timeout,
                )) as Box<dyn Transport>,
                Box::new(SseTransport::new(
                    url.clone(),
                    headers.clone(),
                    backend.to_string(),
                    connect_timeout,
                )) as Box<dyn Transport>,
            ],
        }
    }
}

/// Create an MCP client handler for a backend
pub fn create_client_handler(backend: &str) -> McpClientHandler {
    McpClientHandler::new(backend)
}
