//! In-process indexed key/value store.
//!
//! Every mutation bumps one global index, like a raft log. Blocking queries
//! wait on a `tokio::sync::watch` channel carrying the latest index. The
//! change log keeps the last `history_window` mutations; indices older than
//! that can no longer be waited on and are reported as cleared.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::options_for;
use super::watch::BlockingQuery;
use super::watch::ChangeDetection;
use super::watch::IndexUpdate;
use super::StoreClient;
use crate::config::BackendConfig;
use crate::config::BackendKind;
use crate::constants::TRIGGER_INDEX;
use crate::flatten::KeyTranslator;
use crate::store::FlatMap;
use crate::utils::path;
use crate::Result;

const BACKEND: &str = "memory";

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    modify_index: u64,
}

#[derive(Debug)]
struct Data {
    entries: BTreeMap<String, Entry>,
    /// Latest index. Starts at 1 so a fresh store never reports the
    /// unconditional-fetch sentinel.
    index: u64,
    /// Mutation log, oldest first
    changes: VecDeque<(u64, String)>,
    /// Oldest index a blocking query may still wait on. Every change after
    /// it is still in the log.
    horizon: u64,
}

impl Data {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            index: TRIGGER_INDEX,
            changes: VecDeque::new(),
            horizon: TRIGGER_INDEX,
        }
    }

    fn record(
        &mut self,
        key: &str,
        window: u64,
    ) -> u64 {
        self.index += 1;
        self.changes.push_back((self.index, key.to_string()));
        while self.changes.len() as u64 > window {
            if let Some((dropped, _)) = self.changes.pop_front() {
                self.horizon = dropped;
            }
        }
        self.index
    }

    /// First change after `wait_index` affecting `prefix`.
    fn change_after(
        &self,
        prefix: &str,
        wait_index: u64,
    ) -> Option<u64> {
        self.changes
            .iter()
            .find(|(index, key)| *index > wait_index && under(key, prefix))
            .map(|(index, _)| *index)
    }
}

/// Whether `key` is `prefix` itself or lives beneath it.
fn under(
    key: &str,
    prefix: &str,
) -> bool {
    let prefix = path::clean(&format!("/{prefix}"));
    if prefix == "/" {
        return true;
    }
    key == prefix || key.strip_prefix(prefix.as_str()).is_some_and(|rest| rest.starts_with('/'))
}

struct Settings {
    translator: KeyTranslator,
    max_wait: Duration,
    history_window: u64,
}

impl Settings {
    fn new(config: &BackendConfig) -> Self {
        Self {
            translator: config.key_translator(),
            max_wait: config.max_wait(),
            history_window: config.history_window,
        }
    }
}

struct MemoryInner {
    data: RwLock<Data>,
    index_tx: watch::Sender<u64>,
    settings: ArcSwap<Settings>,
}

impl MemoryInner {
    fn mutate(
        &self,
        key: &str,
        apply: impl FnOnce(&mut BTreeMap<String, Entry>, u64) -> bool,
    ) -> bool {
        let window = self.settings.load().history_window;
        let index = {
            let mut data = self.data.write();
            let next = data.index + 1;
            if !apply(&mut data.entries, next) {
                return false;
            }
            data.record(key, window)
        };
        trace!(key, index, "memory store mutated");
        self.index_tx.send_replace(index);
        true
    }
}

#[async_trait]
impl BlockingQuery for MemoryInner {
    async fn current_index(
        &self,
        _prefix: &str,
    ) -> Result<u64> {
        Ok(self.data.read().index)
    }

    async fn next_index(
        &self,
        prefix: &str,
        wait_index: u64,
    ) -> Result<IndexUpdate> {
        // Subscribe before looking so no mutation slips between the check
        // and the wait.
        let mut rx = self.index_tx.subscribe();
        let deadline = tokio::time::Instant::now() + self.settings.load().max_wait;

        loop {
            {
                let data = self.data.read();
                if wait_index < data.horizon {
                    return Ok(IndexUpdate::HistoryCleared);
                }
                if let Some(index) = data.change_after(prefix, wait_index) {
                    return Ok(IndexUpdate::Advanced(index));
                }
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Ok(IndexUpdate::Advanced(wait_index));
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Ok(IndexUpdate::Advanced(wait_index));
                }
            }
        }
    }
}

/// In-process backend for embedding and tests.
#[derive(Clone)]
pub struct MemoryClient {
    inner: Arc<MemoryInner>,
}

impl MemoryClient {
    pub fn new(config: &BackendConfig) -> Self {
        let (index_tx, _) = watch::channel(TRIGGER_INDEX);
        Self {
            inner: Arc::new(MemoryInner {
                data: RwLock::new(Data::new()),
                index_tx,
                settings: ArcSwap::from_pointee(Settings::new(config)),
            }),
        }
    }

    /// Latest global index.
    pub fn index(&self) -> u64 {
        self.inner.data.read().index
    }

    #[cfg(test)]
    pub(crate) fn change_log_len(&self) -> usize {
        self.inner.data.read().changes.len()
    }
}

#[async_trait]
impl StoreClient for MemoryClient {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get_values(
        &self,
        keys: &[String],
    ) -> Result<FlatMap> {
        let translator = self.inner.settings.load().translator.clone();
        let data = self.inner.data.read();
        let mut vars = FlatMap::new();
        for key in keys {
            for (full, entry) in data.entries.iter().filter(|(k, _)| under(k, key)) {
                vars.insert(translator.translate(full), entry.value.clone());
            }
        }
        Ok(vars)
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        _keys: &[String],
        wait_index: u64,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        ChangeDetection::LongPoll(self.inner.as_ref())
            .wait(prefix, wait_index, cancel)
            .await
    }

    async fn configure(
        &self,
        options: HashMap<String, String>,
    ) -> Result<()> {
        let config = options_for(BackendKind::Memory, &options)?;
        self.inner.settings.store(Arc::new(Settings::new(&config)));
        debug!(?config, "memory client reconfigured");
        Ok(())
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let key = path::clean(&format!("/{key}"));
        self.inner.mutate(&key, |entries, index| {
            entries.insert(
                key.clone(),
                Entry {
                    value: value.to_string(),
                    modify_index: index,
                },
            );
            true
        });
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        let key = path::clean(&format!("/{key}"));
        self.inner.mutate(&key, |entries, _| entries.remove(&key).is_some());
        Ok(())
    }

    async fn key_index(
        &self,
        key: &str,
    ) -> Result<Option<u64>> {
        let key = path::clean(&format!("/{key}"));
        Ok(self.inner.data.read().entries.get(&key).map(|e| e.modify_index))
    }

    async fn check_and_set(
        &self,
        key: &str,
        value: &str,
        expected_index: u64,
    ) -> Result<bool> {
        let key = path::clean(&format!("/{key}"));
        let applied = self.inner.mutate(&key, |entries, index| {
            let current = entries.get(&key).map(|e| e.modify_index).unwrap_or(0);
            if current != expected_index {
                return false;
            }
            entries.insert(
                key.clone(),
                Entry {
                    value: value.to_string(),
                    modify_index: index,
                },
            );
            true
        });
        Ok(applied)
    }
}
