//! etcd v2 HTTP adapter.
//!
//! Keys are fetched as recursive, sorted node trees and flattened. Changes
//! are detected through the `waitIndex` long-poll: the current index comes
//! from the `X-Etcd-Index` header, and a blocking watch for `N + 1` answers
//! with the `modifiedIndex` of the first event past `N`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use reqwest::RequestBuilder;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::http::body_text;
use super::http::index_header;
use super::http::unexpected_status;
use super::http::HttpNodes;
use super::options_for;
use super::watch::BlockingQuery;
use super::watch::ChangeDetection;
use super::watch::IndexUpdate;
use super::StoreClient;
use crate::config::BackendConfig;
use crate::config::BackendKind;
use crate::constants::ETCD_ERROR_EVENT_INDEX_CLEARED;
use crate::constants::ETCD_ERROR_KEY_NOT_FOUND;
use crate::constants::ETCD_ERROR_NODE_EXIST;
use crate::constants::ETCD_ERROR_TEST_FAILED;
use crate::constants::ETCD_INDEX_HEADER;
use crate::constants::LONG_POLL_GRACE_MS;
use crate::flatten::Flattener;
use crate::flatten::Node;
use crate::store::FlatMap;
use crate::utils::path;
use crate::BackendError;
use crate::Result;

const BACKEND: &str = "etcd";

#[derive(Debug, Deserialize)]
struct EtcdResponse {
    node: Option<EtcdNode>,
}

#[derive(Debug, Deserialize)]
struct EtcdNode {
    /// Absent on the root directory
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    nodes: Vec<EtcdNode>,
    #[serde(rename = "modifiedIndex", default)]
    modified_index: u64,
}

impl EtcdNode {
    fn into_node(self) -> Node {
        let key = path::clean(self.key.as_deref().unwrap_or("/"));
        if self.dir {
            Node::dir(key, self.nodes.into_iter().map(EtcdNode::into_node).collect())
        } else {
            Node::leaf(key, self.value.unwrap_or_default())
        }
    }
}

#[derive(Debug, Deserialize)]
struct EtcdErrorBody {
    #[serde(rename = "errorCode")]
    error_code: u64,
    #[serde(default)]
    message: String,
}

fn parse_error(body: &str) -> Option<EtcdErrorBody> {
    serde_json::from_str(body).ok()
}

fn keys_url(
    node: &str,
    key: &str,
) -> String {
    format!("{node}/v2/keys{}", path::clean(&format!("/{key}")))
}

struct EtcdInner {
    http: HttpNodes,
    flattener: Flattener,
    auth: Option<(String, String)>,
    max_wait: Duration,
}

impl EtcdInner {
    fn new(config: &BackendConfig) -> Result<Self> {
        let auth = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };
        Ok(Self {
            http: HttpNodes::new(BACKEND, config)?,
            flattener: Flattener::new(config.key_translator()),
            auth,
            max_wait: config.max_wait(),
        })
    }

    fn authorize(
        &self,
        request: RequestBuilder,
    ) -> RequestBuilder {
        match &self.auth {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    /// Recursive sorted GET. `None` when the key does not exist.
    async fn get_tree(
        &self,
        key: &str,
    ) -> Result<Option<Node>> {
        let response = self
            .http
            .send(self.http.request_timeout(), |client, node| {
                self.authorize(client.get(keys_url(node, key)))
                    .query(&[("recursive", "true"), ("sorted", "true")])
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = body_text(BACKEND, response).await?;
                let parsed: EtcdResponse =
                    serde_json::from_str(&body).map_err(|e| BackendError::malformed(BACKEND, e.to_string()))?;
                Ok(parsed.node.map(EtcdNode::into_node))
            }
            StatusCode::NOT_FOUND => {
                trace!(key, "etcd key not found");
                Ok(None)
            }
            _ => Err(unexpected_status(BACKEND, response).await.into()),
        }
    }

    /// Conditional or unconditional PUT. `Ok(false)` on a failed precondition.
    async fn write(
        &self,
        key: &str,
        value: &str,
        conditions: &[(&str, String)],
    ) -> Result<bool> {
        let response = self
            .http
            .send(self.http.request_timeout(), |client, node| {
                self.authorize(client.put(keys_url(node, key)))
                    .query(conditions)
                    .form(&[("value", value)])
            })
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        let body = body_text(BACKEND, response).await?;
        match parse_error(&body) {
            Some(e)
                if status == StatusCode::PRECONDITION_FAILED
                    || matches!(
                        e.error_code,
                        ETCD_ERROR_TEST_FAILED | ETCD_ERROR_NODE_EXIST | ETCD_ERROR_KEY_NOT_FOUND
                    ) =>
            {
                debug!(key, code = e.error_code, message = %e.message, "etcd compare failed");
                Ok(false)
            }
            _ => Err(BackendError::UnexpectedStatus {
                backend: BACKEND,
                status: status.as_u16(),
                body,
            }
            .into()),
        }
    }
}

#[async_trait]
impl BlockingQuery for EtcdInner {
    async fn current_index(
        &self,
        prefix: &str,
    ) -> Result<u64> {
        let response = self
            .http
            .send(self.http.request_timeout(), |client, node| {
                self.authorize(client.get(keys_url(node, prefix)))
            })
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NOT_FOUND => Ok(index_header(BACKEND, &response, ETCD_INDEX_HEADER)?),
            _ => Err(unexpected_status(BACKEND, response).await.into()),
        }
    }

    async fn next_index(
        &self,
        prefix: &str,
        wait_index: u64,
    ) -> Result<IndexUpdate> {
        let max_wait = self.max_wait;
        let next = (wait_index + 1).to_string();
        let request = self.http.send(max_wait + Duration::from_millis(LONG_POLL_GRACE_MS), |client, node| {
            self.authorize(client.get(keys_url(node, prefix))).query(&[
                ("wait", "true"),
                ("recursive", "true"),
                ("waitIndex", next.as_str()),
            ])
        });

        // etcd v2 has no server-side bound on a watch.
        let response = match tokio::time::timeout(max_wait, request).await {
            Ok(response) => response?,
            Err(_) => {
                trace!(prefix, wait_index, "etcd watch elapsed without change");
                return Ok(IndexUpdate::Advanced(wait_index));
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(IndexUpdate::HistoryCleared);
        }
        let body = body_text(BACKEND, response).await?;
        if status.is_success() {
            let parsed: EtcdResponse =
                serde_json::from_str(&body).map_err(|e| BackendError::malformed(BACKEND, e.to_string()))?;
            let node = parsed
                .node
                .ok_or_else(|| BackendError::malformed(BACKEND, "watch response without node"))?;
            if node.modified_index == 0 {
                return Err(BackendError::malformed(BACKEND, "watch response without modifiedIndex").into());
            }
            return Ok(IndexUpdate::Advanced(node.modified_index));
        }

        match parse_error(&body) {
            Some(e) if e.error_code == ETCD_ERROR_EVENT_INDEX_CLEARED => Ok(IndexUpdate::HistoryCleared),
            _ => Err(BackendError::UnexpectedStatus {
                backend: BACKEND,
                status: status.as_u16(),
                body,
            }
            .into()),
        }
    }
}

/// etcd v2 adapter.
pub struct EtcdClient {
    inner: ArcSwap<EtcdInner>,
}

impl EtcdClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            inner: ArcSwap::from_pointee(EtcdInner::new(config)?),
        })
    }
}

#[async_trait]
impl StoreClient for EtcdClient {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get_values(
        &self,
        keys: &[String],
    ) -> Result<FlatMap> {
        let inner = self.inner.load_full();
        let mut vars = FlatMap::new();
        for key in keys {
            if let Some(tree) = inner.get_tree(key).await? {
                inner.flattener.flatten_into(&tree, &mut vars)?;
            }
        }
        trace!(keys = keys.len(), values = vars.len(), "etcd values fetched");
        Ok(vars)
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        _keys: &[String],
        wait_index: u64,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let inner = self.inner.load_full();
        ChangeDetection::LongPoll(inner.as_ref())
            .wait(prefix, wait_index, cancel)
            .await
    }

    async fn configure(
        &self,
        options: HashMap<String, String>,
    ) -> Result<()> {
        let config = options_for(BackendKind::Etcd, &options)?;
        self.inner.store(Arc::new(EtcdInner::new(&config)?));
        debug!(?config, "etcd client reconfigured");
        Ok(())
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        if self.inner.load_full().write(key, value, &[]).await? {
            Ok(())
        } else {
            Err(BackendError::WriteRejected {
                backend: BACKEND,
                key: key.to_string(),
            }
            .into())
        }
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        let inner = self.inner.load_full();
        let response = inner
            .http
            .send(inner.http.request_timeout(), |client, node| {
                inner.authorize(client.delete(keys_url(node, key)))
            })
            .await?;
        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            _ => Err(unexpected_status(BACKEND, response).await.into()),
        }
    }

    async fn key_index(
        &self,
        key: &str,
    ) -> Result<Option<u64>> {
        let inner = self.inner.load_full();
        let response = inner
            .http
            .send(inner.http.request_timeout(), |client, node| {
                inner.authorize(client.get(keys_url(node, key)))
            })
            .await?;
        match response.status() {
            StatusCode::OK => {
                let body = body_text(BACKEND, response).await?;
                let parsed: EtcdResponse =
                    serde_json::from_str(&body).map_err(|e| BackendError::malformed(BACKEND, e.to_string()))?;
                Ok(parsed.node.map(|n| n.modified_index))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(unexpected_status(BACKEND, response).await.into()),
        }
    }

    async fn check_and_set(
        &self,
        key: &str,
        value: &str,
        expected_index: u64,
    ) -> Result<bool> {
        let condition = if expected_index == 0 {
            ("prevExist", "false".to_string())
        } else {
            ("prevIndex", expected_index.to_string())
        };
        self.inner.load_full().write(key, value, &[condition]).await
    }
}
