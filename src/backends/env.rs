//! Process environment adapter.
//!
//! `/app/db/pass` is looked up as every variable starting with `APP_DB_PASS`;
//! matches come back as lowercase paths (`APP_DB_PASS_OLD` becomes
//! `/app/db/pass/old`). The environment has no change notifications, so
//! watching only waits for cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::options_for;
use super::watch::ChangeDetection;
use super::StoreClient;
use crate::config::BackendConfig;
use crate::config::BackendKind;
use crate::flatten::KeyTranslator;
use crate::store::FlatMap;
use crate::BackendError;
use crate::Result;

const BACKEND: &str = "env";
const DEFAULT_ENV_SEPARATOR: &str = "_";

struct EnvSettings {
    separator: String,
    translator: KeyTranslator,
}

impl EnvSettings {
    fn new(config: &BackendConfig) -> Self {
        Self {
            separator: config.separator.clone().unwrap_or_else(|| DEFAULT_ENV_SEPARATOR.to_string()),
            // the separator is consumed by the variable name mapping
            translator: KeyTranslator::path()
                .with_prefix(config.prefix.clone())
                .with_case(config.key_case),
        }
    }

    /// `/app/db` -> `APP_DB`
    fn to_env(
        &self,
        key: &str,
    ) -> String {
        key.trim_start_matches('/').replace('/', &self.separator).to_uppercase()
    }

    /// `APP_DB` -> `/app/db`
    fn to_key(
        &self,
        name: &str,
    ) -> String {
        format!("/{}", name.to_lowercase().replace(&self.separator, "/"))
    }
}

/// Environment variable adapter.
pub struct EnvClient {
    settings: ArcSwap<EnvSettings>,
}

impl EnvClient {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            settings: ArcSwap::from_pointee(EnvSettings::new(config)),
        }
    }
}

#[async_trait]
impl StoreClient for EnvClient {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get_values(
        &self,
        keys: &[String],
    ) -> Result<FlatMap> {
        let settings = self.settings.load();
        let prefixes: Vec<String> = keys.iter().map(|k| settings.to_env(k)).collect();

        let mut vars = FlatMap::new();
        for (name, value) in std::env::vars_os() {
            let Some(name) = name.to_str() else {
                trace!(name = ?name, "skipping non UTF-8 variable name");
                continue;
            };
            if !prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                continue;
            }
            let value = value.into_string().map_err(|_| BackendError::Decode {
                path: name.to_string(),
                reason: "value is not valid UTF-8".to_string(),
            })?;
            let key = settings.to_key(name);
            vars.insert(settings.translator.translate(&key), value);
        }
        debug!(keys = ?keys, values = vars.len(), "environment scanned");
        Ok(vars)
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        _keys: &[String],
        wait_index: u64,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        ChangeDetection::Passive.wait(prefix, wait_index, cancel).await
    }

    async fn configure(
        &self,
        options: HashMap<String, String>,
    ) -> Result<()> {
        let config = options_for(BackendKind::Env, &options)?;
        self.settings.store(Arc::new(EnvSettings::new(&config)));
        Ok(())
    }
}
