//! Consul KV HTTP adapter.
//!
//! Values come from recursive `?recurse` listings with base64 payloads. The
//! change index is the `X-Consul-Index` header; a blocking query passes it
//! back as `index` together with a bounded `wait`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
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
use crate::constants::CONSUL_INDEX_HEADER;
use crate::constants::CONSUL_TOKEN_HEADER;
use crate::constants::LONG_POLL_GRACE_MS;
use crate::flatten::KeyTranslator;
use crate::store::FlatMap;
use crate::utils::path;
use crate::BackendError;
use crate::Result;

const BACKEND: &str = "consul";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KvEntry {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    modify_index: u64,
}

fn kv_url(
    node: &str,
    key: &str,
) -> String {
    format!("{node}/v1/kv/{}", key.trim_start_matches('/'))
}

struct ConsulInner {
    http: HttpNodes,
    translator: KeyTranslator,
    token: Option<String>,
    datacenter: Option<String>,
    max_wait: Duration,
}

impl ConsulInner {
    fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            http: HttpNodes::new(BACKEND, config)?,
            translator: config.key_translator(),
            token: config.auth_token.clone(),
            datacenter: config.datacenter.clone(),
            max_wait: config.max_wait(),
        })
    }

    /// Adds the ACL token and datacenter to every request.
    fn scoped(
        &self,
        mut request: RequestBuilder,
    ) -> RequestBuilder {
        if let Some(token) = &self.token {
            request = request.header(CONSUL_TOKEN_HEADER, token);
        }
        if let Some(dc) = &self.datacenter {
            request = request.query(&[("dc", dc)]);
        }
        request
    }

    async fn list(
        &self,
        key: &str,
    ) -> Result<Vec<KvEntry>> {
        let response = self
            .http
            .send(self.http.request_timeout(), |client, node| {
                self.scoped(client.get(kv_url(node, key))).query(&[("recurse", "")])
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = body_text(BACKEND, response).await?;
                let entries = serde_json::from_str(&body).map_err(|e| BackendError::malformed(BACKEND, e.to_string()))?;
                Ok(entries)
            }
            StatusCode::NOT_FOUND => Ok(vec![]),
            _ => Err(unexpected_status(BACKEND, response).await.into()),
        }
    }

    /// PUT returning the boolean response body.
    async fn write(
        &self,
        key: &str,
        value: &str,
        cas: Option<u64>,
    ) -> Result<bool> {
        let cas = cas.map(|index| index.to_string());
        let response = self
            .http
            .send(self.http.request_timeout(), |client, node| {
                let request = self.scoped(client.put(kv_url(node, key))).body(value.to_string());
                match &cas {
                    Some(index) => request.query(&[("cas", index)]),
                    None => request,
                }
            })
            .await?;

        if !response.status().is_success() {
            return Err(unexpected_status(BACKEND, response).await.into());
        }
        let body = body_text(BACKEND, response).await?;
        match body.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(BackendError::malformed(BACKEND, format!("expected boolean body, got {other:?}")).into()),
        }
    }
}

fn decode_value(entry: &KvEntry) -> Result<Option<String>> {
    let Some(encoded) = &entry.value else {
        return Ok(None);
    };
    let raw = STANDARD
        .decode(encoded)
        .map_err(|e| BackendError::malformed(BACKEND, format!("value of {} is not base64: {e}", entry.key)))?;
    let value = String::from_utf8(raw)
        .map_err(|e| BackendError::malformed(BACKEND, format!("value of {} is not utf-8: {e}", entry.key)))?;
    Ok(Some(value))
}

#[async_trait]
impl BlockingQuery for ConsulInner {
    async fn current_index(
        &self,
        prefix: &str,
    ) -> Result<u64> {
        let response = self
            .http
            .send(self.http.request_timeout(), |client, node| {
                self.scoped(client.get(kv_url(node, prefix))).query(&[("recurse", "")])
            })
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NOT_FOUND => Ok(index_header(BACKEND, &response, CONSUL_INDEX_HEADER)?),
            _ => Err(unexpected_status(BACKEND, response).await.into()),
        }
    }

    async fn next_index(
        &self,
        prefix: &str,
        wait_index: u64,
    ) -> Result<IndexUpdate> {
        let index = wait_index.to_string();
        let wait = format!("{}ms", self.max_wait.as_millis());
        let response = self
            .http
            .send(self.max_wait + Duration::from_millis(LONG_POLL_GRACE_MS), |client, node| {
                self.scoped(client.get(kv_url(node, prefix))).query(&[
                    ("recurse", ""),
                    ("index", index.as_str()),
                    ("wait", wait.as_str()),
                ])
            })
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NOT_FOUND => Ok(IndexUpdate::Advanced(index_header(
                BACKEND,
                &response,
                CONSUL_INDEX_HEADER,
            )?)),
            StatusCode::FORBIDDEN => {
                debug!(prefix, "consul ACL rejected blocking query");
                Ok(IndexUpdate::HistoryCleared)
            }
            _ => Err(unexpected_status(BACKEND, response).await.into()),
        }
    }
}

/// Consul KV adapter.
pub struct ConsulClient {
    inner: ArcSwap<ConsulInner>,
}

impl ConsulClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            inner: ArcSwap::from_pointee(ConsulInner::new(config)?),
        })
    }
}

#[async_trait]
impl StoreClient for ConsulClient {
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
            for entry in inner.list(key).await? {
                // folder markers carry no value
                if entry.key.ends_with('/') {
                    continue;
                }
                if let Some(value) = decode_value(&entry)? {
                    let full = path::join(["/", entry.key.as_str()]);
                    vars.insert(inner.translator.translate(&full), value);
                }
            }
        }
        trace!(keys = keys.len(), values = vars.len(), "consul values fetched");
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
        let config = options_for(BackendKind::Consul, &options)?;
        self.inner.store(Arc::new(ConsulInner::new(&config)?));
        debug!(?config, "consul client reconfigured");
        Ok(())
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        if self.inner.load_full().write(key, value, None).await? {
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
                inner.scoped(client.delete(kv_url(node, key)))
            })
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(unexpected_status(BACKEND, response).await.into())
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
                inner.scoped(client.get(kv_url(node, key)))
            })
            .await?;
        match response.status() {
            StatusCode::OK => {
                let body = body_text(BACKEND, response).await?;
                let entries: Vec<KvEntry> =
                    serde_json::from_str(&body).map_err(|e| BackendError::malformed(BACKEND, e.to_string()))?;
                Ok(entries.first().map(|e| e.modify_index))
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
        // cas=0 only writes when the key does not exist yet
        self.inner.load_full().write(key, value, Some(expected_index)).await
    }
}
