//! Proxy lifecycle
//!
//! Start: first configuration snapshot → connect every backend → bind the
//! outward endpoint → poll for further snapshots and reconcile each change.
//!
//! Dispose: cancel polling → wait for the poller → drain in-flight calls →
//! close every backend → close the endpoint. Disposal runs once no matter
//! how many callers ask for it.

use std::sync::Arc;

use fanout_core::{Configuration, ProxyError};
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::endpoint::OutwardEndpoint;
use crate::mcp::FanoutHandler;
use crate::pool::{Aggregator, Connector, Reconciler, Registry};
use crate::services::ConfigSource;

/// Everything needed to start a proxy
pub struct FanoutProxy {
    source: ConfigSource,
    connector: Arc<dyn Connector>,
    endpoint: Box<dyn OutwardEndpoint>,
    annotate_origin: bool,
}

impl FanoutProxy {
    pub fn new(
        source: ConfigSource,
        connector: Arc<dyn Connector>,
        endpoint: Box<dyn OutwardEndpoint>,
    ) -> Self {
        Self {
            source,
            connector,
            endpoint,
            annotate_origin: true,
        }
    }

    pub fn with_origin_annotation(mut self, annotate: bool) -> Self {
        self.annotate_origin = annotate;
        self
    }

    /// Start serving.
    ///
    /// Fails on an authentication or shape error in the first snapshot and
    /// when the endpoint cannot bind. Unreachable backends or an unreachable
    /// configuration endpoint still produce a running proxy.
    pub async fn start(self) -> Result<ProxyHandle, ProxyError> {
        let FanoutProxy {
            source,
            connector,
            mut endpoint,
            annotate_origin,
        } = self;

        let registry = Arc::new(Registry::new());
        let reconciler = Arc::new(Reconciler::new(registry.clone(), connector));
        let aggregator =
            Arc::new(Aggregator::new(registry.clone()).with_origin_annotation(annotate_origin));
        let cancel = CancellationToken::new();
        let stopped = CancellationToken::new();

        let mut snapshots = Box::pin(source.snapshots(cancel.clone()));
        let first = match snapshots.next().await {
            Some(Ok(config)) => config,
            Some(Err(e)) => {
                error!(error = %e, "Failed to load initial configuration");
                return Err(e);
            }
            None => Configuration::empty(),
        };
        if first.is_empty() {
            info!("No backends configured, waiting for configuration");
        }

        let summary = reconciler.connect_all(&first).await;
        info!("Startup: {}", summary);

        let handler = FanoutHandler::new(aggregator.clone());
        if let Err(e) = endpoint.bind(handler, stopped.clone()).await {
            cancel.cancel();
            reconciler.disconnect_all().await;
            return Err(ProxyError::startup(
                format!("failed to bind {} endpoint", endpoint.description()),
                e,
            ));
        }

        let inner = Arc::new(ProxyInner {
            registry,
            aggregator,
            reconciler: reconciler.clone(),
            cancel,
            stopped: stopped.clone(),
            failure: parking_lot::Mutex::new(None),
            teardown: tokio::sync::Mutex::new(None),
        });

        let poller = tokio::spawn(poll_snapshots(snapshots, first, reconciler, inner.clone()));
        *inner.teardown.lock().await = Some(Teardown { poller, endpoint });

        info!("Proxy started");
        Ok(ProxyHandle { inner })
    }
}

/// Apply every further snapshot. An error ends polling and stops the proxy.
async fn poll_snapshots<S>(
    mut snapshots: S,
    mut current: Configuration,
    reconciler: Arc<Reconciler>,
    inner: Arc<ProxyInner>,
) where
    S: Stream<Item = Result<Configuration, ProxyError>> + Unpin,
{
    while let Some(next) = snapshots.next().await {
        match next {
            Ok(config) => {
                reconciler.reconcile(&current, &config).await;
                current = config;
            }
            Err(e) => {
                error!(error = %e, "Configuration polling failed, stopping proxy");
                *inner.failure.lock() = Some(e);
                inner.stopped.cancel();
                return;
            }
        }
    }
    debug!("Configuration poller exited");
}

struct Teardown {
    poller: JoinHandle<()>,
    endpoint: Box<dyn OutwardEndpoint>,
}

struct ProxyInner {
    registry: Arc<Registry>,
    aggregator: Arc<Aggregator>,
    reconciler: Arc<Reconciler>,
    /// Stops configuration polling
    cancel: CancellationToken,
    /// Fires when the proxy should stop: fatal polling error, outward peer
    /// gone, or disposal
    stopped: CancellationToken,
    failure: parking_lot::Mutex<Option<ProxyError>>,
    teardown: tokio::sync::Mutex<Option<Teardown>>,
}

/// Handle to a running proxy. Clones share the same proxy.
#[derive(Clone)]
pub struct ProxyHandle {
    inner: Arc<ProxyInner>,
}

impl ProxyHandle {
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.inner.aggregator
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.is_cancelled()
    }

    /// Resolves when the proxy stops on its own or is disposed. Returns the
    /// fatal error that stopped it, if any, to every caller.
    pub async fn wait(&self) -> Result<(), ProxyError> {
        self.inner.stopped.cancelled().await;
        match self.inner.failure.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Tear everything down. Safe to call repeatedly and concurrently; only
    /// the first call does any work, later ones wait for it to finish.
    pub async fn dispose(&self) {
        let mut slot = self.inner.teardown.lock().await;
        let Some(teardown) = slot.take() else {
            debug!("Proxy already disposed");
            return;
        };
        let Teardown { poller, mut endpoint } = teardown;

        info!("Shutting down");
        self.inner.cancel.cancel();

        if let Err(e) = poller.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Configuration poller ended abnormally");
            }
        }

        self.inner.aggregator.drain().await;
        self.inner.reconciler.disconnect_all().await;

        if let Err(e) = endpoint.close().await {
            warn!(endpoint = %endpoint.description(), error = %e, "Failed to close endpoint");
        }

        self.inner.stopped.cancel();
        info!("Shutdown complete");
    }
}
