//! Connection reconciler
//!
//! Applies a configuration snapshot to the registry with the minimal set of
//! operations: added backends connect, removed ones disconnect, changed ones
//! are disconnected then connected again, unchanged ones are left alone.
//! Every backend is handled in isolation and connects run concurrently.

use std::fmt;
use std::sync::Arc;

use fanout_core::Configuration;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::connector::Connector;
use super::registry::Registry;

/// Outcome of connecting every backend of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectSummary {
    pub connected: usize,
    pub total: usize,
    pub failed: Vec<String>,
}

impl fmt::Display for ConnectSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} connected", self.connected, self.total)
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub reconnected: Vec<String>,
    pub unchanged: usize,
    /// Added or changed backends that could not be connected
    pub failed: Vec<String>,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.reconnected.is_empty()
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} reconnected, {} unchanged, {} failed",
            self.added.len(),
            self.removed.len(),
            self.reconnected.len(),
            self.unchanged,
            self.failed.len()
        )
    }
}

pub struct Reconciler {
    registry: Arc<Registry>,
    connector: Arc<dyn Connector>,
}

impl Reconciler {
    pub fn new(registry: Arc<Registry>, connector: Arc<dyn Connector>) -> Self {
        Self {
            registry,
            connector,
        }
    }

    /// Connect every backend declared in `config`, concurrently.
    pub async fn connect_all(&self, config: &Configuration) -> ConnectSummary {
        let names: Vec<&str> = config.names().collect();
        let outcomes = join_all(names.iter().map(|name| self.connect_one(config, name))).await;

        let mut summary = ConnectSummary {
            total: names.len(),
            ..Default::default()
        };
        for (name, connected) in names.iter().zip(outcomes) {
            if connected {
                summary.connected += 1;
            } else {
                summary.failed.push(name.to_string());
            }
        }

        info!(failed = ?summary.failed, "Backends: {}", summary);
        summary
    }

    /// Move the registry from `old` to `new`.
    pub async fn reconcile(&self, old: &Configuration, new: &Configuration) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for name in old.names() {
            if !new.contains(name) {
                summary.removed.push(name.to_string());
            }
        }
        for name in new.names() {
            if !old.contains(name) {
                summary.added.push(name.to_string());
            } else if old.entry_differs(new, name) {
                summary.reconnected.push(name.to_string());
            } else {
                summary.unchanged += 1;
            }
        }

        if summary.is_noop() {
            debug!("Reconcile: nothing to do");
            return summary;
        }

        let stale = summary.removed.iter().chain(summary.reconnected.iter());
        join_all(stale.map(|name| self.disconnect(name))).await;

        let fresh: Vec<&String> = summary.added.iter().chain(summary.reconnected.iter()).collect();
        let outcomes = join_all(fresh.iter().map(|name| self.connect_one(new, name))).await;
        let failed: Vec<String> = fresh
            .iter()
            .zip(outcomes)
            .filter(|(_, connected)| !connected)
            .map(|(name, _)| name.to_string())
            .collect();
        summary.failed = failed;

        info!(
            added = ?summary.added,
            removed = ?summary.removed,
            reconnected = ?summary.reconnected,
            "Reconciled: {}",
            summary
        );
        summary
    }

    /// Disconnect every registered backend and empty the registry.
    pub async fn disconnect_all(&self) {
        let connections = self.registry.clear_all();
        let closes = connections.iter().map(|connection| async move {
            if let Err(e) = connection.client.close().await {
                warn!(backend = %connection.name, error = %e, "Failed to close backend");
            }
        });
        join_all(closes).await;
    }

    async fn connect_one(&self, config: &Configuration, name: &str) -> bool {
        let descriptor = match config.descriptor(name) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(backend = %name, error = %e, "Skipping backend");
                return false;
            }
        };

        match self.connector.connect(name, &descriptor).await {
            Some(connection) => {
                self.registry.set_connection(name, connection);
                true
            }
            None => false,
        }
    }

    async fn disconnect(&self, name: &str) {
        self.registry.forget_routes(name);
        let Some(connection) = self.registry.remove_connection(name) else {
            debug!(backend = %name, "Not connected, nothing to close");
            return;
        };
        match connection.client.close().await {
            Ok(()) => info!(backend = %name, "Backend disconnected"),
            Err(e) => warn!(backend = %name, error = %e, "Failed to close backend, dropping it"),
        }
    }
}
