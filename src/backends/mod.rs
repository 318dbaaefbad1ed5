//! Backend adapters behind one fetch-and-wait contract.
//!
//! The watch orchestrator drives a [`StoreClient`] in a strict sequence:
//! `get_values`, then `watch_prefix` with the last index it saw, then
//! `get_values` again. Index `0` always means "fetch unconditionally".
//!
//! | backend | change detection |
//! |---------|------------------|
//! | etcd    | index long-poll (`waitIndex`) |
//! | consul  | index long-poll (blocking query) |
//! | memory  | index long-poll (in-process) |
//! | file    | filesystem listener |
//! | env     | none |

mod consul;
mod env;
mod etcd;
mod file;
mod http;
mod memory;
mod watch;

pub use consul::*;
pub use env::*;
pub use etcd::*;
pub use file::*;
pub use memory::*;

#[cfg(test)]
mod env_test;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::BackendConfig;
use crate::config::BackendKind;
use crate::store::FlatMap;
use crate::BackendError;
use crate::Result;

/// Capability contract every backend implements.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Short backend name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Fetches every requested key. Directories contribute all the leaves
    /// beneath them; missing keys contribute nothing.
    ///
    /// # Errors
    /// Only real I/O, protocol or authorization failures.
    async fn get_values(
        &self,
        keys: &[String],
    ) -> Result<FlatMap>;

    /// Blocks until something under `prefix` (or one of `keys`) changes past
    /// `wait_index`, then returns the new index.
    ///
    /// - `wait_index == 0` never blocks.
    /// - Cancellation returns promptly with the last known index.
    /// - A returned `0` asks the caller for an unconditional fetch.
    async fn watch_prefix(
        &self,
        prefix: &str,
        keys: &[String],
        wait_index: u64,
        cancel: &CancellationToken,
    ) -> Result<u64>;

    /// Re-initializes the adapter from a string option map.
    ///
    /// # Errors
    /// [`BackendError::InvalidOption`] for unknown keys or values, or when
    /// the options name another backend.
    async fn configure(
        &self,
        options: HashMap<String, String>,
    ) -> Result<()>;

    /// Unconditional write.
    async fn put(
        &self,
        _key: &str,
        _value: &str,
    ) -> Result<()> {
        Err(unsupported(self.name(), "put"))
    }

    async fn delete(
        &self,
        _key: &str,
    ) -> Result<()> {
        Err(unsupported(self.name(), "delete"))
    }

    /// Current change index of a single key, `None` when the key is absent.
    async fn key_index(
        &self,
        _key: &str,
    ) -> Result<Option<u64>> {
        Err(unsupported(self.name(), "key_index"))
    }

    /// Writes `value` only if the key's change index equals
    /// `expected_index`; `0` means the key must not exist yet.
    ///
    /// A mismatch is `Ok(false)`. `Err` means the request itself failed.
    async fn check_and_set(
        &self,
        _key: &str,
        _value: &str,
        _expected_index: u64,
    ) -> Result<bool> {
        Err(unsupported(self.name(), "check_and_set"))
    }
}

fn unsupported(
    backend: &'static str,
    operation: &'static str,
) -> crate::Error {
    BackendError::Unsupported { backend, operation }.into()
}

/// Builds the adapter selected by `config.kind`.
pub fn new_store_client(config: &BackendConfig) -> Result<Box<dyn StoreClient>> {
    config.validate()?;
    info!(backend = config.kind.as_str(), "creating store client");

    let client: Box<dyn StoreClient> = match config.kind {
        BackendKind::Etcd => Box::new(EtcdClient::new(config)?),
        BackendKind::Consul => Box::new(ConsulClient::new(config)?),
        BackendKind::File => Box::new(FileClient::new(config)),
        BackendKind::Env => Box::new(EnvClient::new(config)),
        BackendKind::Memory => Box::new(MemoryClient::new(config)),
    };
    Ok(client)
}

/// Parses `configure` options for a backend of `kind`.
pub(crate) fn options_for(
    kind: BackendKind,
    options: &HashMap<String, String>,
) -> Result<BackendConfig> {
    let mut config = BackendConfig::from_options(options)?;
    let named = options.get("backend").or_else(|| options.get("kind"));
    if named.is_some() && config.kind != kind {
        return Err(BackendError::invalid_option(
            "backend",
            format!("{} adapter cannot be configured as {}", kind.as_str(), config.kind.as_str()),
        )
        .into());
    }
    config.kind = kind;
    config.validate()?;
    Ok(config)
}
