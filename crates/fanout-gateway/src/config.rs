//! Process configuration
//!
//! Every setting is read once at startup (see [`branding::env`] for the
//! variable names) and handed down explicitly; nothing below this module
//! touches the environment.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fanout_core::{branding, branding::env, RetryPolicy};
use thiserror::Error;
use url::Url;

use crate::pool::{BackendConnector, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::server::{FanoutProxy, HttpEndpoint, OutwardEndpoint, StdioEndpoint};
use crate::services::{ConfigSource, DEFAULT_POLL_INTERVAL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be an integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be true or false, got '{value}'")]
    InvalidFlag { var: &'static str, value: String },

    #[error("{var} must be a JSON object of string values: {reason}")]
    InvalidHeaders { var: &'static str, reason: String },

    #[error("{var} must be 'stdio' or http://host:port, got '{value}'")]
    InvalidEndpoint { var: &'static str, value: String },
}

/// Where the proxy listens for its outward client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointConfig {
    Stdio,
    Http(SocketAddr),
}

impl EndpointConfig {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidEndpoint {
            var: env::ENDPOINT,
            value: value.to_string(),
        };

        if value.eq_ignore_ascii_case("stdio") {
            return Ok(EndpointConfig::Stdio);
        }
        let url = Url::parse(value).map_err(|_| invalid())?;
        if url.scheme() != "http" {
            return Err(invalid());
        }
        let addr = url
            .socket_addrs(|| None)
            .ok()
            .and_then(|addrs| addrs.into_iter().next())
            .ok_or_else(invalid)?;
        Ok(EndpointConfig::Http(addr))
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub config_url: Option<String>,
    pub config_headers: BTreeMap<String, String>,
    /// `None` disables polling
    pub poll_interval: Option<Duration>,
    pub namespace: String,
    pub log_path: Option<PathBuf>,
    pub endpoint: EndpointConfig,
    pub annotate_origin: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_url: None,
            config_headers: BTreeMap::new(),
            poll_interval: Some(DEFAULT_POLL_INTERVAL),
            namespace: branding::DEFAULT_NAMESPACE.to_string(),
            log_path: None,
            endpoint: EndpointConfig::Stdio,
            annotate_origin: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        config.config_url = get(env::CONFIG_URL);

        if let Some(raw) = get(env::CONFIG_HEADERS) {
            config.config_headers =
                serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidHeaders {
                    var: env::CONFIG_HEADERS,
                    reason: e.to_string(),
                })?;
        }

        if let Some(raw) = get(env::POLL_INTERVAL_MS) {
            let ms = parse_number(env::POLL_INTERVAL_MS, &raw)?;
            config.poll_interval = (ms > 0).then(|| Duration::from_millis(ms as u64));
        }

        if let Some(namespace) = get(env::NAMESPACE) {
            config.namespace = namespace;
        }

        config.log_path = get(env::LOG_PATH).map(PathBuf::from);

        if let Some(raw) = get(env::ENDPOINT) {
            config.endpoint = EndpointConfig::parse(&raw)?;
        }

        if let Some(raw) = get(env::ANNOTATE_ORIGIN) {
            config.annotate_origin = parse_flag(env::ANNOTATE_ORIGIN, &raw)?;
        }

        if let Some(raw) = get(env::CONNECT_TIMEOUT_MS) {
            config.connect_timeout = parse_timeout(env::CONNECT_TIMEOUT_MS, &raw)?;
        }

        if let Some(raw) = get(env::REQUEST_TIMEOUT_MS) {
            config.request_timeout = parse_timeout(env::REQUEST_TIMEOUT_MS, &raw)?;
        }

        Ok(config)
    }

    pub fn config_source(&self) -> ConfigSource {
        ConfigSource::new(self.config_url.clone())
            .with_headers(self.config_headers.clone())
            .with_poll_interval(self.poll_interval)
            .with_namespace(self.namespace.clone())
    }

    pub fn connector(&self) -> BackendConnector {
        BackendConnector::new(
            RetryPolicy::default(),
            self.connect_timeout,
            self.request_timeout,
        )
    }

    pub fn endpoint(&self) -> Box<dyn OutwardEndpoint> {
        match self.endpoint {
            EndpointConfig::Stdio => Box::new(StdioEndpoint::new()),
            EndpointConfig::Http(addr) => Box::new(HttpEndpoint::new(addr)),
        }
    }

    /// Assemble a proxy ready to start
    pub fn proxy(&self) -> FanoutProxy {
        FanoutProxy::new(
            self.config_source(),
            Arc::new(self.connector()),
            self.endpoint(),
        )
        .with_origin_annotation(self.annotate_origin)
    }
}

fn parse_number(var: &'static str, raw: &str) -> Result<i64, ConfigError> {
    raw.parse::<i64>().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.to_string(),
    })
}

fn parse_timeout(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let ms = parse_number(var, raw)?;
    if ms <= 0 {
        return Err(ConfigError::InvalidNumber {
            var,
            value: raw.to_string(),
        });
    }
    Ok(Duration::from_millis(ms as u64))
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            var,
            value: raw.to_string(),
        }),
    }
}
