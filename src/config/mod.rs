//! Configuration management for cache-dance

pub mod schema;

pub use schema::{
    BuilderConfig, CacheConfig, CacheOptions, Config, DefinitionInput, JobModel, MountOptions,
    OutputStrategy, TransferConfig,
};

use crate::cache::CacheMount;
use crate::error::{DanceError, DanceResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cache-dance")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> DanceResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> DanceResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| DanceError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| DanceError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a `--cache-map` JSON object
pub fn parse_cache_map(json: &str) -> DanceResult<BTreeMap<String, CacheOptions>> {
    if json.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(json).map_err(|e| DanceError::CacheMapInvalid(e.to_string()))
}

impl Config {
    /// Resolve the configured cache mounts
    ///
    /// Falls back to the single `cache.source` -> `cache.target` pair when the
    /// map is empty. Every mount is validated before it is returned.
    pub fn cache_mounts(&self) -> DanceResult<Vec<CacheMount>> {
        if self.cache.map.is_empty() {
            let fallback = CacheOptions::Target(self.cache.target.clone());
            return Ok(vec![CacheMount::from_options(&self.cache.source, &fallback)?]);
        }

        self.cache
            .map
            .iter()
            .map(|(source, options)| CacheMount::from_options(source, options))
            .collect()
    }
}
