use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CONNECT_TIMEOUT_MS;
use crate::constants::DEFAULT_CONSUL_NODE;
use crate::constants::DEFAULT_ETCD_NODE;
use crate::constants::DEFAULT_HISTORY_WINDOW;
use crate::constants::DEFAULT_MAX_WAIT_MS;
use crate::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::constants::DEFAULT_SCHEME;
use crate::flatten::KeyCase;
use crate::flatten::KeyTranslator;
use crate::BackendError;
use crate::Error;
use crate::Result;

/// Supported remote store families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// etcd v2 HTTP API: raft index long-poll, hierarchical nodes
    #[default]
    Etcd,
    /// Consul KV HTTP API: blocking-query index long-poll
    Consul,
    /// Local YAML/JSON/TOML documents watched through filesystem events
    File,
    /// Process environment, no native watch support
    Env,
    /// In-process indexed store
    Memory,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Etcd => "etcd",
            BackendKind::Consul => "consul",
            BackendKind::File => "file",
            BackendKind::Env => "env",
            BackendKind::Memory => "memory",
        }
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "etcd" => Ok(BackendKind::Etcd),
            "consul" => Ok(BackendKind::Consul),
            "file" => Ok(BackendKind::File),
            "env" => Ok(BackendKind::Env),
            "memory" => Ok(BackendKind::Memory),
            other => Err(BackendError::InvalidBackend(other.to_string())),
        }
    }
}

/// Connection and key translation parameters of one backend instance
///
/// Field-level defaults use helper functions prefixed with `default_`.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct BackendConfig {
    /// Which store family to talk to
    ///
    /// Default: etcd
    #[serde(default)]
    pub kind: BackendKind,

    /// Store endpoints (`host:port` or full URLs). Empty selects the
    /// backend's well-known local address.
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Scheme added to nodes given without one
    ///
    /// Default: "http"
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Prefix stripped from every returned key
    #[serde(default)]
    pub prefix: String,

    /// Flat-key separator. `None` keeps keys as `/` paths.
    #[serde(default)]
    pub separator: Option<String>,

    /// Case normalization of returned keys
    #[serde(default)]
    pub key_case: KeyCase,

    /// Documents or directories read by the file backend
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Basic auth credentials (etcd)
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    /// ACL token (consul)
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Datacenter (consul)
    #[serde(default)]
    pub datacenter: Option<String>,

    /// Server-side bound of a blocking query, in milliseconds
    ///
    /// Default: 30000
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Default: 3000
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bound of a non-blocking request, in milliseconds
    ///
    /// Default: 10000
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Number of past mutations the memory backend keeps for blocking
    /// queries. Waiting on an older index reports a history reset.
    ///
    /// Default: 1000
    #[serde(default = "default_history_window")]
    pub history_window: u64,
}

impl Debug for BackendConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("nodes", &self.nodes)
            .field("prefix", &self.prefix)
            .field("separator", &self.separator)
            .field("files", &self.files)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("max_wait_ms", &self.max_wait_ms)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            nodes: vec![],
            scheme: default_scheme(),
            prefix: String::new(),
            separator: None,
            key_case: KeyCase::default(),
            files: vec![],
            username: None,
            password: None,
            auth_token: None,
            datacenter: None,
            max_wait_ms: default_max_wait_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            history_window: default_history_window(),
        }
    }
}

impl BackendConfig {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Validates backend configuration consistency
    /// # Errors
    /// Returns `Error::Config` if any configuration rule is violated
    pub fn validate(&self) -> Result<()> {
        if self.kind == BackendKind::File && self.files.is_empty() {
            return Err(config_error("file backend requires at least one entry in files"));
        }

        if matches!(self.separator.as_deref(), Some("")) {
            return Err(config_error("separator cannot be empty"));
        }

        if self.max_wait_ms == 0 {
            return Err(config_error("max_wait_ms must be greater than 0"));
        }

        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(config_error("timeouts must be greater than 0"));
        }

        if self.username.is_some() != self.password.is_some() {
            return Err(config_error("username and password must be set together"));
        }

        if self.history_window == 0 {
            return Err(config_error("history_window must be greater than 0"));
        }

        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(config_error(&format!(
                "unsupported scheme {:?}, expected http or https",
                self.scheme
            )));
        }

        Ok(())
    }

    /// Builds a configuration from a plugin-style option map.
    ///
    /// Recognized keys mirror the struct fields; `backend` is accepted as an
    /// alias of `kind`, and `nodes`/`files` take comma-separated lists.
    ///
    /// # Errors
    /// [`BackendError::InvalidOption`] for unknown keys or unparsable values
    pub fn from_options(options: &HashMap<String, String>) -> std::result::Result<Self, BackendError> {
        let mut cfg = Self::default();
        for (key, value) in options {
            match key.as_str() {
                "kind" | "backend" => cfg.kind = value.parse()?,
                "nodes" => cfg.nodes = split_list(value),
                "scheme" => cfg.scheme = value.clone(),
                "prefix" => cfg.prefix = value.clone(),
                "separator" => cfg.separator = non_empty(value),
                "key_case" => {
                    cfg.key_case = match value.to_ascii_lowercase().as_str() {
                        "preserve" | "" => KeyCase::Preserve,
                        "lower" => KeyCase::Lower,
                        "upper" => KeyCase::Upper,
                        _ => return Err(BackendError::invalid_option(key, "expected preserve, lower or upper")),
                    }
                }
                "files" => cfg.files = split_list(value).into_iter().map(PathBuf::from).collect(),
                "username" => cfg.username = non_empty(value),
                "password" => cfg.password = non_empty(value),
                "auth_token" => cfg.auth_token = non_empty(value),
                "datacenter" => cfg.datacenter = non_empty(value),
                "max_wait_ms" => cfg.max_wait_ms = parse_u64(key, value)?,
                "connect_timeout_ms" => cfg.connect_timeout_ms = parse_u64(key, value)?,
                "request_timeout_ms" => cfg.request_timeout_ms = parse_u64(key, value)?,
                "history_window" => cfg.history_window = parse_u64(key, value)?,
                _ => return Err(BackendError::invalid_option(key, "unknown option")),
            }
        }
        Ok(cfg)
    }

    /// Endpoints with the backend's default substituted for an empty list
    pub fn nodes_or_default(&self) -> Vec<String> {
        if !self.nodes.is_empty() {
            return self.nodes.clone();
        }
        match self.kind {
            BackendKind::Etcd => vec![DEFAULT_ETCD_NODE.to_string()],
            BackendKind::Consul => vec![DEFAULT_CONSUL_NODE.to_string()],
            _ => vec![],
        }
    }

    /// Key translation rule derived from prefix, separator and case
    pub fn key_translator(&self) -> KeyTranslator {
        let translator = match &self.separator {
            Some(sep) => KeyTranslator::flat(sep.clone()),
            None => KeyTranslator::path(),
        };
        translator.with_prefix(self.prefix.clone()).with_case(self.key_case)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn config_error(msg: &str) -> Error {
    Error::Config(ConfigError::Message(msg.to_string()))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_u64(
    key: &str,
    value: &str,
) -> std::result::Result<u64, BackendError> {
    value
        .trim()
        .parse()
        .map_err(|e| BackendError::invalid_option(key, format!("{value:?} is not a number: {e}")))
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}
fn default_max_wait_ms() -> u64 {
    DEFAULT_MAX_WAIT_MS
}
fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}
fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
fn default_history_window() -> u64 {
    DEFAULT_HISTORY_WINDOW
}
