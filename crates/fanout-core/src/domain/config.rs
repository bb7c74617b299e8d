//! Configuration snapshots
//!
//! A snapshot is the backend mapping found under `<namespace>.servers` in the
//! fetched document. Entries are kept as raw JSON, in document order, so that
//! equality can be decided on the serialized form: two snapshots are equal iff
//! they serialize identically, including key and array order.

use serde_json::{Map, Value};

use crate::domain::BackendDescriptor;
use crate::error::ProxyError;

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    servers: Map<String, Value>,
}

impl Configuration {
    /// Configuration with no backends
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_servers(servers: Map<String, Value>) -> Self {
        Self { servers }
    }

    /// Parse a response body of the shape `{ <namespace>: { servers: {..} } }`
    pub fn parse(body: &str, namespace: &str) -> Result<Self, ProxyError> {
        let document: Value = serde_json::from_str(body)
            .map_err(|e| ProxyError::Configuration(format!("response is not valid JSON: {}", e)))?;
        Self::from_document(&document, namespace)
    }

    pub fn from_document(document: &Value, namespace: &str) -> Result<Self, ProxyError> {
        let servers = document
            .get(namespace)
            .and_then(|ns| ns.get("servers"))
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ProxyError::Configuration(format!(
                    "response has no `{}.servers` mapping",
                    namespace
                ))
            })?;

        Ok(Self {
            servers: servers.clone(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Backend names in document order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    /// Raw entry for a backend
    pub fn entry(&self, name: &str) -> Option<&Value> {
        self.servers.get(name)
    }

    /// Typed descriptor for a backend. A malformed entry is an error for that
    /// backend only.
    pub fn descriptor(&self, name: &str) -> Result<BackendDescriptor, ProxyError> {
        let entry = self
            .servers
            .get(name)
            .ok_or_else(|| {
                ProxyError::Configuration(format!("backend '{}' is not declared", name))
            })?;
        serde_json::from_value(entry.clone()).map_err(|e| {
            ProxyError::Configuration(format!("backend '{}' has an invalid entry: {}", name, e))
        })
    }

    /// Whether `name` is declared differently in `other` (absent counts as different)
    pub fn entry_differs(&self, other: &Configuration, name: &str) -> bool {
        match (self.entry(name), other.entry(name)) {
            (Some(a), Some(b)) => canonical(a) != canonical(b),
            (None, None) => false,
            _ => true,
        }
    }

    /// Serialized-form equality (order sensitive)
    pub fn same_as(&self, other: &Configuration) -> bool {
        canonical_map(&self.servers) == canonical_map(&other.servers)
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

fn canonical(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn canonical_map(map: &Map<String, Value>) -> String {
    serde_json::to_string(map).unwrap_or_default()
}
