//! Error taxonomy
//!
//! `BackendError` describes how a single backend call failed. `ProxyError`
//! is what the proxy itself reports to its callers; only some variants are
//! fatal (see [`ProxyError::is_fatal`]).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Failure of one request against one backend
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend does not implement the requested method
    #[error("method not supported by backend: {0}")]
    Unsupported(String),

    /// The backend did not answer in time
    #[error("backend request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with a protocol error
    #[error("backend returned error {code}: {message}")]
    Protocol { code: i32, message: String },

    /// The connection to the backend is gone
    #[error("backend connection closed")]
    Closed,

    /// Anything else (transport, (de)serialization)
    #[error("{0}")]
    Transport(String),
}

impl BackendError {
    /// Unsupported and timeout failures degrade to an empty result instead
    /// of being reported.
    pub fn is_degradable(&self) -> bool {
        matches!(self, BackendError::Unsupported(_) | BackendError::Timeout(_))
    }
}

/// Errors surfaced by the proxy. Cloneable so a stop reason can be
/// reported to every waiter.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// Configuration endpoint answered 401. Never retried, never swallowed.
    #[error("authentication failed fetching configuration from {url}")]
    Authentication { url: String },

    /// Configuration body could not be parsed or lacks the backend mapping
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A follow-up call referenced an identifier with no recorded backend
    #[error("no backend recorded for {category} '{identifier}'")]
    RoutingNotFound { category: String, identifier: String },

    /// A routed call failed on its backend and there is nothing to fall back on
    #[error("request to backend '{backend}' failed: {source}")]
    ClientRequest {
        backend: String,
        #[source]
        source: BackendError,
    },

    /// Registry lookup by backend name failed
    #[error("connection '{0}' not found")]
    ConnectionNotFound(String),

    /// Startup step failed for a reason not covered above
    #[error("{context}")]
    Startup {
        context: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl ProxyError {
    pub fn startup(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ProxyError::Startup {
            context: context.into(),
            source: Arc::from(source.into()),
        }
    }

    pub fn routing_not_found(category: impl Into<String>, identifier: impl Into<String>) -> Self {
        ProxyError::RoutingNotFound {
            category: category.into(),
            identifier: identifier.into(),
        }
    }

    /// Errors that must stop the proxy rather than degrade it
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProxyError::Authentication { .. } | ProxyError::Startup { .. }
        )
    }
}
