//! In-memory snapshot of the most recently fetched key/value set.
//!
//! The watch orchestrator replaces the whole snapshot after every successful
//! `get_values`, while the rendering engine reads it concurrently. Readers
//! share a `parking_lot::RwLock`; a bulk replace holds the write lock for its
//! whole duration so readers see either the old or the new snapshot, never a
//! mix of both.
//!
//! Each [`SnapshotStore`] owns its own lock. Cloning a store yields another
//! handle to the same snapshot.

mod pattern;
pub use pattern::*;


use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::utils::path;
use crate::StoreError;

/// Flat key/value mapping produced by backends and flattening.
pub type FlatMap = HashMap<String, String>;

/// A single snapshot entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KvPair {
    pub key: String,
    pub value: String,
}

impl KvPair {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Concurrency-safe key/value snapshot with glob queries.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    entries: Arc<RwLock<HashMap<String, KvPair>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-loaded with `values`.
    pub fn from_map(values: FlatMap) -> Self {
        let store = Self::new();
        store.replace_all(values);
        store
    }

    /// Point lookup by exact key.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when the key is absent.
    pub fn get(
        &self,
        key: &str,
    ) -> Result<KvPair, StoreError> {
        self.entries.read().get(key).cloned().ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })
    }

    /// Value of `key`, or `default` when given and the key is absent.
    pub fn get_value(
        &self,
        key: &str,
        default: Option<&str>,
    ) -> Result<String, StoreError> {
        match self.get(key) {
            Ok(kv) => Ok(kv.value),
            Err(e) => default.map(str::to_string).ok_or(e),
        }
    }

    pub fn exists(
        &self,
        key: &str,
    ) -> bool {
        self.entries.read().contains_key(key)
    }

    /// All entries whose full key path matches `pattern`, sorted by key.
    ///
    /// # Errors
    /// - [`StoreError::BadPattern`] for malformed glob syntax
    /// - [`StoreError::NoMatch`] when nothing matches
    pub fn get_all(
        &self,
        pattern: &str,
    ) -> Result<Vec<KvPair>, StoreError> {
        let pattern = Pattern::new(pattern)?;

        let mut matched: Vec<KvPair> = {
            let entries = self.entries.read();
            entries.values().filter(|kv| pattern.matches(&kv.key)).cloned().collect()
        };
        if matched.is_empty() {
            return Err(StoreError::NoMatch {
                pattern: pattern.as_str().to_string(),
            });
        }
        matched.sort();
        Ok(matched)
    }

    /// Values of every entry matching `pattern`, sorted by value.
    pub fn get_all_values(
        &self,
        pattern: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut values: Vec<String> = self.get_all(pattern)?.into_iter().map(|kv| kv.value).collect();
        values.sort();
        Ok(values)
    }

    /// Sorted unique names of the immediate children of `dir_path`, leaves
    /// and directories alike. A key equal to `dir_path` contributes its own
    /// base name.
    pub fn list(
        &self,
        dir_path: &str,
    ) -> Vec<String> {
        let prefix = path::terms(dir_path);
        let mut names = BTreeSet::new();

        let entries = self.entries.read();
        for key in entries.keys() {
            if key == dir_path {
                names.insert(path::base(key));
                continue;
            }
            let target = path::terms(&path::dir(key));
            if path::same_prefix_terms(&prefix, &target) {
                let stripped = key.strip_prefix(dir_path).unwrap_or(key).trim_start_matches('/');
                if let Some(first) = stripped.split('/').next() {
                    names.insert(first.to_string());
                }
            }
        }
        names.into_iter().collect()
    }

    /// Sorted unique names of the immediate child directories of `dir_path`.
    pub fn list_dir(
        &self,
        dir_path: &str,
    ) -> Vec<String> {
        let prefix = path::terms(dir_path);
        let mut names = BTreeSet::new();

        let entries = self.entries.read();
        for key in entries.keys().filter(|k| k.starts_with(dir_path)) {
            let items = path::terms(&path::dir(key));
            if path::same_prefix_terms(&prefix, &items) && items.len() > prefix.len() {
                names.insert(items[prefix.len()].clone());
            }
        }
        names.into_iter().collect()
    }

    /// Sets a single entry. Used by direct, non-tree stores only.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        let kv = KvPair::new(key, value);
        self.entries.write().insert(kv.key.clone(), kv);
    }

    /// Deletes the entry for `key`; deleting a missing key is a no-op.
    pub fn del(
        &self,
        key: &str,
    ) {
        self.entries.write().remove(key);
    }

    pub fn purge(&self) {
        self.entries.write().clear();
    }

    /// Atomically swaps the whole snapshot for `values`.
    pub fn replace_all(
        &self,
        values: FlatMap,
    ) {
        let next: HashMap<String, KvPair> = values
            .into_iter()
            .map(|(key, value)| (key.clone(), KvPair { key, value }))
            .collect();
        trace!(entries = next.len(), "replacing snapshot");
        *self.entries.write() = next;
    }

    /// Atomically inserts or overwrites every entry of `values`, keeping
    /// keys not mentioned.
    pub fn merge(
        &self,
        values: FlatMap,
    ) {
        let mut entries = self.entries.write();
        for (key, value) in values {
            entries.insert(key.clone(), KvPair { key, value });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of every entry sorted by key.
    pub fn snapshot(&self) -> Vec<KvPair> {
        let mut all: Vec<KvPair> = self.entries.read().values().cloned().collect();
        all.sort();
        all
    }
}
