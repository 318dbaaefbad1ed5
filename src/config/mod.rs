//! Configuration management for backend adapters.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`CONFD__` prefix)
//! - Plugin-style string option maps (see [`BackendConfig::from_options`])
mod backend;
pub use backend::*;

#[cfg(test)]
mod backend_test;
#[cfg(test)]
mod config_test;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Root configuration container
///
/// Sources are merged with later sources overriding earlier ones:
/// 1. Default values from code
/// 2. Configuration file named by `CONFIG_PATH`
/// 3. Environment variables with `CONFD__` prefix (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct ConfdConfig {
    /// Remote store connection and translation settings
    #[serde(default)]
    pub backend: BackendConfig,
}

impl Debug for ConfdConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConfdConfig").field("backend", &self.backend).finish()
    }
}

impl ConfdConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Validation is deferred so callers can apply further overrides with
    /// [`Self::with_override_config`]. Call [`Self::validate`] before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/confd.toml");
    /// std::env::set_var("CONFD__BACKEND__KIND", "consul");
    /// let cfg = ConfdConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional overrides from `path` without validation.
    ///
    /// Environment variables are re-applied on top so they keep the highest
    /// priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.backend.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("CONFD")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("backend.nodes")
        .with_list_parse_key("backend.files")
        .ignore_empty(true)
        .try_parsing(true)
}
