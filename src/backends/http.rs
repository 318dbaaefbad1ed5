//! HTTP plumbing shared by the etcd and consul adapters.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use reqwest::Client;
use reqwest::RequestBuilder;
use reqwest::Response;
use tracing::debug;
use tracing::warn;

use crate::config::BackendConfig;
use crate::utils::net::with_scheme_all;
use crate::BackendError;

/// Reqwest client plus the ordered node list of one backend.
///
/// Requests go to the last node that answered; connection failures fail
/// over to the next node in configuration order.
pub(crate) struct HttpNodes {
    backend: &'static str,
    client: Client,
    nodes: Vec<String>,
    active: AtomicUsize,
    request_timeout: Duration,
}

impl HttpNodes {
    pub(crate) fn new(
        backend: &'static str,
        config: &BackendConfig,
    ) -> Result<Self, BackendError> {
        let nodes = with_scheme_all(&config.nodes_or_default(), &config.scheme);
        if nodes.is_empty() {
            return Err(BackendError::invalid_option("nodes", "at least one node is required"));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| BackendError::transport(backend, e))?;

        debug!(backend, ?nodes, "http backend initialized");
        Ok(Self {
            backend,
            client,
            nodes,
            active: AtomicUsize::new(0),
            request_timeout: config.request_timeout(),
        })
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Sends the request produced by `build` for a node base URL.
    ///
    /// # Errors
    /// - [`BackendError::Timeout`] when `timeout` elapses
    /// - [`BackendError::Unreachable`] when no node accepts a connection
    /// - [`BackendError::Transport`] for any other client failure
    pub(crate) async fn send<F>(
        &self,
        timeout: Duration,
        build: F,
    ) -> Result<Response, BackendError>
    where
        F: Fn(&Client, &str) -> RequestBuilder + Send + Sync,
    {
        let start = self.active.load(Ordering::Relaxed);
        for offset in 0..self.nodes.len() {
            let idx = (start + offset) % self.nodes.len();
            let node = &self.nodes[idx];

            match build(&self.client, node).timeout(timeout).send().await {
                Ok(response) => {
                    if idx != start {
                        debug!(backend = self.backend, node, "switched active node");
                        self.active.store(idx, Ordering::Relaxed);
                    }
                    return Ok(response);
                }
                Err(e) if e.is_timeout() => {
                    return Err(BackendError::Timeout {
                        backend: self.backend,
                        duration: timeout,
                    });
                }
                Err(e) if e.is_connect() => {
                    warn!(backend = self.backend, node, error = %e, "node unreachable");
                }
                Err(e) => return Err(BackendError::transport(self.backend, e)),
            }
        }

        Err(BackendError::Unreachable {
            backend: self.backend,
            nodes: self.nodes.join(","),
        })
    }
}

/// Parses a string-encoded index header.
pub(crate) fn index_header(
    backend: &'static str,
    response: &Response,
    header: &str,
) -> Result<u64, BackendError> {
    let raw = response
        .headers()
        .get(header)
        .ok_or_else(|| BackendError::malformed(backend, format!("missing {header} header")))?;
    raw.to_str()
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| BackendError::malformed(backend, format!("unparsable {header} header: {raw:?}")))
}

/// Reads the body of a response whose status falls outside the adapter's
/// contract.
pub(crate) async fn unexpected_status(
    backend: &'static str,
    response: Response,
) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::UnexpectedStatus { backend, status, body }
}

pub(crate) async fn body_text(
    backend: &'static str,
    response: Response,
) -> Result<String, BackendError> {
    response.text().await.map_err(|e| BackendError::transport(backend, e))
}
