//! Backend descriptor
//!
//! Follows the standard MCP server entry format used by editors and desktop
//! clients: transport fields sit at the top level, with no `transport: {}`
//! wrapper. `url` (+ optional `headers`) selects an HTTP backend,
//! `command`/`args`/`env` selects a child process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    // --- HTTP Transport (URL-based) ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    // --- Stdio Transport (command-based) ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl BackendDescriptor {
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Default::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// `url` wins over `command` when both are present
    pub fn is_http(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn is_stdio(&self) -> bool {
        !self.is_http() && self.command.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    /// Neither a URL nor a command: nothing can be connected
    pub fn has_transport(&self) -> bool {
        self.is_http() || self.is_stdio()
    }
}
