//! Layered configuration loading
//!
//! Priority (highest to lowest):
//! 1. Environment variables, `<PREFIX>` + nested keys split on `__`
//! 2. YAML file (explicit path, else the first existing search path)
//! 3. Serialized defaults
//!
//! Services apply their own legacy variable overrides on top with
//! [`env_override`].

use errors::{config_error, PulseResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Builder for a layered figment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
    explicit_file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new(env_prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: env_prefix.into(),
            explicit_file: None,
            search_paths: Vec::new(),
        }
    }

    /// Explicit config file; it must exist
    pub fn with_file(mut self, path: Option<impl AsRef<Path>>) -> Self {
        self.explicit_file = path.map(|p| p.as_ref().to_path_buf());
        self
    }

    /// Candidate file used when no explicit file is given
    pub fn search(mut self, path: impl AsRef<Path>) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// The YAML file that will be read, if any
    pub fn resolve_file(&self) -> PulseResult<Option<PathBuf>> {
        if let Some(path) = &self.explicit_file {
            if !path.exists() {
                return Err(config_error!("config file not found: {}", path.display()));
            }
            return Ok(Some(path.clone()));
        }
        Ok(self.search_paths.iter().find(|p| p.exists()).cloned())
    }

    pub fn figment<T: Serialize>(&self, defaults: &T) -> PulseResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(defaults));
        if let Some(path) = self.resolve_file()? {
            info!("Loading configuration from {}", path.display());
            figment = figment.merge(Yaml::file(path));
        }
        Ok(figment.merge(Env::prefixed(&self.env_prefix).split("__")))
    }

    /// Extract the merged configuration
    pub fn load<T>(&self) -> PulseResult<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        self.figment(&T::default())?
            .extract()
            .map_err(|e| config_error!("Failed to load configuration: {}", e))
    }
}

/// Non-empty environment variable value
pub fn env_override(env_var: &str) -> Option<String> {
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => {
            info!("Using {} from environment", env_var);
            Some(value)
        },
        _ => None,
    }
}
