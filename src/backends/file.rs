//! Local YAML/JSON/TOML documents.
//!
//! Each configured path is a document or a directory of documents. Documents
//! are decoded into a node tree rooted at `/`, flattened, and filtered down
//! to the requested key prefixes. A `notify` watcher over the same paths
//! feeds the listener channel.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use notify::event::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::options_for;
use super::watch::ChangeDetection;
use super::watch::ChangeNotifier;
use super::watch::ListenerRegistration;
use super::watch::ListenerWatcher;
use super::StoreClient;
use crate::config::BackendConfig;
use crate::config::BackendKind;
use crate::flatten::value_to_node;
use crate::flatten::Flattener;
use crate::flatten::KeyTranslator;
use crate::store::FlatMap;
use crate::BackendError;
use crate::Result;

const BACKEND: &str = "file";

struct FileSettings {
    paths: Vec<PathBuf>,
    translator: KeyTranslator,
}

impl FileSettings {
    fn new(config: &BackendConfig) -> Self {
        Self {
            paths: config.files.clone(),
            translator: config.key_translator(),
        }
    }
}

/// Expands directories into the regular files beneath them.
async fn files_lookup(paths: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut pending = paths.to_vec();
    let mut files = Vec::new();
    while let Some(path) = pending.pop() {
        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.is_dir() {
            let mut entries = tokio::fs::read_dir(&path).await?;
            while let Some(entry) = entries.next_entry().await? {
                pending.push(entry.path());
            }
        } else if metadata.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Decodes by extension; anything else is read as YAML, a superset of JSON.
fn decode(
    path: &Path,
    contents: &str,
) -> std::result::Result<Value, BackendError> {
    let decode_error = |reason: String| BackendError::Decode {
        path: path.display().to_string(),
        reason,
    };
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(contents).map_err(|e| decode_error(e.to_string())),
        Some("toml") => toml::from_str(contents).map_err(|e| decode_error(e.to_string())),
        _ => serde_yaml::from_str(contents).map_err(|e| decode_error(e.to_string())),
    }
}

/// Whether `key` falls under one of the requested prefixes.
fn requested(
    key: &str,
    keys: &[String],
) -> bool {
    keys.iter().any(|k| key.starts_with(k.as_str()))
}

/// Owns the `notify` watcher for as long as the client lives.
struct FsRegistration {
    settings: Arc<ArcSwap<FileSettings>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl ListenerRegistration for FsRegistration {
    fn register(
        &self,
        notifier: ChangeNotifier,
    ) -> Result<()> {
        let paths = self.settings.load().paths.clone();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| match event {
            Ok(event) => match event.kind {
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                    trace!(paths = ?event.paths, "file change detected");
                    notifier.changed();
                }
                _ => {}
            },
            Err(e) => notifier.failed(e.to_string()),
        })
        .map_err(BackendError::from)?;

        for path in &paths {
            watcher.watch(path, RecursiveMode::Recursive).map_err(BackendError::from)?;
        }
        debug!(?paths, "file watcher started");

        // replacing drops the previous watcher and its OS handles
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }
}

/// File backend.
pub struct FileClient {
    settings: Arc<ArcSwap<FileSettings>>,
    flattener: Flattener,
    listener: ListenerWatcher,
}

impl FileClient {
    pub fn new(config: &BackendConfig) -> Self {
        let settings = Arc::new(ArcSwap::from_pointee(FileSettings::new(config)));
        let registration = Arc::new(FsRegistration {
            settings: settings.clone(),
            watcher: Mutex::new(None),
        });
        Self {
            settings,
            flattener: Flattener::default(),
            listener: ListenerWatcher::new(registration),
        }
    }

    async fn read_all(
        &self,
        paths: &[PathBuf],
    ) -> Result<FlatMap> {
        let files = files_lookup(paths).await.map_err(BackendError::from)?;
        let mut vars = FlatMap::new();
        for file in files {
            let contents = tokio::fs::read_to_string(&file).await.map_err(BackendError::from)?;
            let value = match decode(&file, &contents) {
                Ok(value) => value,
                Err(e) => {
                    // half-written files are common while editors save
                    warn!(path = %file.display(), error = %e, "skipping undecodable file");
                    continue;
                }
            };
            if let Some(tree) = value_to_node("/", &value)? {
                self.flattener.flatten_into(&tree, &mut vars)?;
            }
        }
        Ok(vars)
    }
}

#[async_trait]
impl StoreClient for FileClient {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get_values(
        &self,
        keys: &[String],
    ) -> Result<FlatMap> {
        let settings = self.settings.load_full();
        let vars = self.read_all(&settings.paths).await?;
        let filtered: FlatMap = vars
            .into_iter()
            .filter(|(k, _)| requested(k, keys))
            .map(|(k, v)| (settings.translator.translate(&k), v))
            .collect();
        trace!(values = filtered.len(), "file values loaded");
        Ok(filtered)
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        _keys: &[String],
        wait_index: u64,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        ChangeDetection::Listener(&self.listener)
            .wait(prefix, wait_index, cancel)
            .await
    }

    async fn configure(
        &self,
        options: HashMap<String, String>,
    ) -> Result<()> {
        let config = options_for(BackendKind::File, &options)?;
        self.settings.store(Arc::new(FileSettings::new(&config)));
        self.listener.reset();
        debug!(files = ?config.files, "file client reconfigured");
        Ok(())
    }
}
