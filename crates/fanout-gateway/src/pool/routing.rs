//! Request aggregation and routing
//!
//! Enumeration calls are broadcast to every live backend and merged; each
//! enumerated item records a route so that follow-up calls (call a tool,
//! get a prompt, read a resource) reach the backend that listed it.
//! Connections are read from the registry per call, never cached.

use std::sync::Arc;

use fanout_core::category::{self, OperationCategory};
use fanout_core::ProxyError;
use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::client::BackendConnection;
use super::registry::Registry;

pub struct Aggregator {
    registry: Arc<Registry>,
    annotate_origin: bool,
    /// Held shared by every call; taken exclusively to wait out in-flight
    /// calls before teardown.
    inflight: RwLock<()>,
}

impl Aggregator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            annotate_origin: true,
            inflight: RwLock::new(()),
        }
    }

    /// Whether enumerated items get a `[backend]` tag on their label field
    pub fn with_origin_annotation(mut self, annotate: bool) -> Self {
        self.annotate_origin = annotate;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Send `method` to every live backend and merge the item lists.
    ///
    /// All calls run to completion; a failing backend contributes nothing.
    pub async fn broadcast(&self, method: &str, params: Value) -> Value {
        let _inflight = self.inflight.read().await;

        let field = category::result_field(method);
        let follow_up = category::follow_up_method(method);
        let operation = category::lookup(method);
        let connections = self.registry.all_connections();

        let calls = connections.iter().map(|connection| {
            let params = params.clone();
            async move { connection.client.request(method, params).await }
        });
        let outcomes = join_all(calls).await;

        let mut merged = Vec::new();
        for (connection, outcome) in connections.iter().zip(outcomes) {
            match outcome {
                Ok(mut result) => {
                    let items = match result.get_mut(field).map(Value::take) {
                        Some(Value::Array(items)) => items,
                        _ => {
                            debug!(backend = %connection.name, method, "No `{}` list in result", field);
                            continue;
                        }
                    };
                    debug!(backend = %connection.name, method, count = items.len(), "Merged items");
                    for mut item in items {
                        if let Some(operation) = operation {
                            self.track(operation, follow_up, &mut item, connection);
                        }
                        merged.push(item);
                    }
                }
                Err(e) if e.is_degradable() => {
                    warn!(backend = %connection.name, method, error = %e, "Backend skipped");
                }
                Err(e) => {
                    error!(backend = %connection.name, method, error = %e, "Backend failed");
                }
            }
        }

        let mut body = Map::new();
        body.insert(field.to_string(), Value::Array(merged));
        Value::Object(body)
    }

    /// Forward a follow-up call to the backend that enumerated its target.
    pub async fn route(&self, method: &str, params: Value) -> Result<Value, ProxyError> {
        let _inflight = self.inflight.read().await;

        let identifier = category::call_identifier(&params)
            .unwrap_or_default()
            .to_string();
        let connection = self.registry.resolve_route(method, &identifier)?;
        debug!(backend = %connection.name, method, identifier = %identifier, "Routing call");

        match connection.client.request(method, params).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_degradable() => {
                warn!(backend = %connection.name, method, error = %e, "Degrading to empty result");
                Ok(category::empty_result(method))
            }
            Err(source) => Err(ProxyError::ClientRequest {
                backend: connection.name.clone(),
                source,
            }),
        }
    }

    /// Wait until no call is in flight.
    pub async fn drain(&self) {
        let _exclusive = self.inflight.write().await;
    }

    fn track(
        &self,
        operation: &OperationCategory,
        follow_up: &str,
        item: &mut Value,
        connection: &Arc<BackendConnection>,
    ) {
        if let Some(identifier) = category::item_identifier(operation, item) {
            self.registry
                .record_route(follow_up, identifier, connection.clone());
        }
        if self.annotate_origin {
            tag_origin(item, operation.label_field, &connection.name);
        }
    }
}

/// Prefix `field` with `[backend]`, creating it when absent.
fn tag_origin(item: &mut Value, field: &str, backend: &str) {
    let Some(object) = item.as_object_mut() else {
        return;
    };
    let tagged = match object.get(field).and_then(Value::as_str) {
        Some(text) if !text.is_empty() => format!("[{}] {}", backend, text),
        _ => format!("[{}]", backend),
    };
    object.insert(field.to_string(), Value::String(tagged));
}
