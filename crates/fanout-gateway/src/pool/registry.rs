//! Backend registry
//!
//! Two tables behind one lock: the primary table (backend name → live
//! connection) and the routing table ((follow-up method, identifier) →
//! connection that enumerated it). Every operation takes the lock once and
//! never across an await, so readers always observe whole updates.
//!
//! A route is only honoured while its connection is still the one in the
//! primary table under that name; routes to replaced or removed
//! connections resolve as not found.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use fanout_core::category::{methods, template_matches};
use fanout_core::ProxyError;
use parking_lot::RwLock;
use tracing::debug;

use super::client::BackendConnection;

type RouteKey = (String, String);

#[derive(Default)]
struct Tables {
    connections: BTreeMap<String, Arc<BackendConnection>>,
    routes: HashMap<RouteKey, Arc<BackendConnection>>,
}

impl Tables {
    fn is_live(&self, connection: &Arc<BackendConnection>) -> bool {
        self.connections
            .get(&connection.name)
            .is_some_and(|current| Arc::ptr_eq(current, connection))
    }
}

#[derive(Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert; the previous connection under `name` is replaced, not merged.
    pub fn set_connection(&self, name: &str, connection: Arc<BackendConnection>) {
        self.tables
            .write()
            .connections
            .insert(name.to_string(), connection);
    }

    pub fn get_connection(&self, name: &str) -> Result<Arc<BackendConnection>, ProxyError> {
        self.tables
            .read()
            .connections
            .get(name)
            .cloned()
            .ok_or_else(|| ProxyError::ConnectionNotFound(name.to_string()))
    }

    /// Snapshot of live connections in name order
    pub fn all_connections(&self) -> Vec<Arc<BackendConnection>> {
        self.tables.read().connections.values().cloned().collect()
    }

    /// Remove from the primary table only. Routes left behind stop
    /// resolving because their connection is no longer live.
    pub fn remove_connection(&self, name: &str) -> Option<Arc<BackendConnection>> {
        self.tables.write().connections.remove(name)
    }

    /// Drop every route recorded against `name`
    pub fn forget_routes(&self, name: &str) {
        self.tables
            .write()
            .routes
            .retain(|_, connection| connection.name != name);
    }

    /// Empty both tables in one step
    pub fn clear_all(&self) -> Vec<Arc<BackendConnection>> {
        let mut tables = self.tables.write();
        tables.routes.clear();
        std::mem::take(&mut tables.connections).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.tables.read().connections.keys().cloned().collect()
    }

    /// Upsert a route. Ignored when `connection` has already been replaced
    /// or removed, so a slow listing cannot clobber a newer live route.
    pub fn record_route(&self, method: &str, identifier: &str, connection: Arc<BackendConnection>) {
        let key = (method.to_string(), identifier.to_string());
        let mut tables = self.tables.write();
        if !tables.is_live(&connection) {
            debug!(
                method,
                identifier,
                backend = %connection.name,
                "Skipping route from a stale connection"
            );
            return;
        }
        if let Some(previous) = tables.routes.get(&key) {
            if previous.name != connection.name {
                debug!(
                    method,
                    identifier,
                    previous = %previous.name,
                    backend = %connection.name,
                    "Route claimed by another backend"
                );
            }
        }
        tables.routes.insert(key, connection);
    }

    /// Resolve the connection owning `identifier` for `method`.
    ///
    /// `resources/read` additionally falls back to the recorded resource
    /// template with the longest fixed prefix matching the URI.
    pub fn resolve_route(
        &self,
        method: &str,
        identifier: &str,
    ) -> Result<Arc<BackendConnection>, ProxyError> {
        let tables = self.tables.read();

        let exact = tables
            .routes
            .get(&(method.to_string(), identifier.to_string()))
            .filter(|connection| tables.is_live(connection));
        if let Some(connection) = exact {
            return Ok(connection.clone());
        }

        if method == methods::READ_RESOURCE {
            let by_template = tables
                .routes
                .iter()
                .filter(|((route_method, template), connection)| {
                    route_method == method
                        && template_matches(template, identifier)
                        && tables.is_live(connection)
                })
                .max_by_key(|((_, template), _)| template.find('{').unwrap_or(0))
                .map(|(_, connection)| connection.clone());
            if let Some(connection) = by_template {
                return Ok(connection);
            }
        }

        Err(ProxyError::routing_not_found(method, identifier))
    }
}
