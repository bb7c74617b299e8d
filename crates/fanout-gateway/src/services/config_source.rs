//! Configuration source
//!
//! Fetches the backend mapping over HTTP and turns repeated fetches into a
//! stream of snapshots. Only changed snapshots are emitted.
//!
//! Failure policy per fetch:
//! - no URL, malformed URL, network error, timeout, non-2xx other than 401:
//!   the empty configuration
//! - 401: [`ProxyError::Authentication`], which also ends the stream
//! - body that is not the expected shape: [`ProxyError::Configuration`];
//!   fatal for the first fetch, logged and skipped while polling

use std::collections::BTreeMap;
use std::time::Duration;

use fanout_core::{branding, Configuration, ProxyError};
use futures::Stream;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::pool::transport::build_header_map;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ConfigSource {
    url: Option<String>,
    headers: BTreeMap<String, String>,
    poll_interval: Option<Duration>,
    namespace: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSource")
            .field("url", &self.url)
            .field("header_count", &self.headers.len())
            .field("poll_interval", &self.poll_interval)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl ConfigSource {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            headers: BTreeMap::new(),
            poll_interval: Some(DEFAULT_POLL_INTERVAL),
            namespace: branding::DEFAULT_NAMESPACE.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Extra request headers. `Accept` is always overridden.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// `None` fetches once and stops
    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval.filter(|d| !d.is_zero());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval
    }

    /// Fetch one snapshot. Network-class failures are logged and give the
    /// empty configuration.
    pub async fn fetch(&self) -> Result<Configuration, ProxyError> {
        match self.try_fetch().await? {
            Fetched::Loaded(config) => Ok(config),
            Fetched::Unavailable(reason) => {
                reason.log();
                Ok(Configuration::empty())
            }
        }
    }

    /// One fetch with no failure logging; the caller decides whether a
    /// fallback is worth reporting.
    async fn try_fetch(&self) -> Result<Fetched, ProxyError> {
        let Some(raw_url) = self.url.as_deref() else {
            debug!("No configuration URL set, using empty configuration");
            return Ok(Fetched::Loaded(Configuration::empty()));
        };
        let url = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(e) => {
                return Ok(Fetched::unavailable(
                    raw_url,
                    "Malformed configuration URL",
                    e,
                ))
            }
        };

        let mut headers = match build_header_map(&self.headers) {
            Ok(headers) => headers,
            Err(e) => {
                return Ok(Fetched::unavailable(
                    raw_url,
                    "Invalid configuration request headers",
                    e,
                ))
            }
        };
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        debug!(url = %url, "Fetching configuration");
        let response = match self
            .client
            .get(url.clone())
            .headers(headers)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Ok(Fetched::unavailable(raw_url, "Configuration fetch timed out", e))
            }
            Err(e) => return Ok(Fetched::unavailable(raw_url, "Configuration fetch failed", e)),
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProxyError::Authentication {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Ok(Fetched::unavailable(
                raw_url,
                "Configuration endpoint returned an error",
                status,
            ));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Ok(Fetched::unavailable(
                    raw_url,
                    "Failed to read configuration body",
                    e,
                ))
            }
        };

        Configuration::parse(&body, &self.namespace).map(Fetched::Loaded)
    }

    /// Snapshot stream: the first fetch, then one item per change.
    ///
    /// An error on the first fetch is yielded and ends the stream. While
    /// polling, authentication failures are yielded and end the stream;
    /// shape errors are logged and skipped. Nothing is yielded or logged as
    /// a failure once `cancel` fires.
    pub fn snapshots(
        &self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<Configuration, ProxyError>> + Send + 'static {
        let source = self.clone();
        async_stream::stream! {
            let mut last = match source.fetch().await {
                Ok(config) => config,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            info!(backends = last.len(), "Initial configuration loaded");
            yield Ok(last.clone());

            let Some(interval) = source.poll_interval else {
                debug!("Configuration polling disabled");
                return;
            };

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let fetched = tokio::select! {
                    _ = cancel.cancelled() => break,
                    fetched = source.try_fetch() => fetched,
                };
                if cancel.is_cancelled() {
                    debug!("Configuration polling cancelled during fetch");
                    break;
                }
                let fetched = fetched.map(|outcome| match outcome {
                    Fetched::Loaded(config) => config,
                    Fetched::Unavailable(reason) => {
                        reason.log();
                        Configuration::empty()
                    }
                });

                match fetched {
                    Ok(config) if config == last => {
                        debug!("Configuration unchanged");
                    }
                    Ok(config) => {
                        info!(backends = config.len(), "Configuration changed");
                        last = config.clone();
                        yield Ok(config);
                    }
                    Err(e @ ProxyError::Authentication { .. }) => {
                        error!(error = %e, "Configuration polling stopped");
                        yield Err(e);
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "Ignoring unusable configuration from poll");
                    }
                }
            }
            debug!("Configuration polling stopped");
        }
    }
}

enum Fetched {
    Loaded(Configuration),
    /// No usable answer; stands in for the empty configuration
    Unavailable(Unavailable),
}

impl Fetched {
    fn unavailable(url: &str, what: &'static str, cause: impl std::fmt::Display) -> Self {
        Fetched::Unavailable(Unavailable {
            url: url.to_string(),
            what,
            cause: cause.to_string(),
        })
    }
}

struct Unavailable {
    url: String,
    what: &'static str,
    cause: String,
}

impl Unavailable {
    fn log(&self) {
        warn!(
            url = %self.url,
            error = %self.cause,
            "{}, using empty configuration",
            self.what
        );
    }
}
