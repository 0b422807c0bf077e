//! Service configuration, loaded from a YAML file.
//!
//! Every section is optional; missing values fall back to defaults.

use std::path::{Path, PathBuf};

use acquisition::AcquisitionConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;
use wind_cache::CacheConfig;
use wind_common::FocusPoint;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Focus used for cropping until the first query arrives.
    #[serde(default)]
    pub initial_focus: FocusPoint,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory holding `gribFiles/` and `csvFiles/`.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Query the distribution server directly when no local data covers a query.
    #[serde(default = "default_remote_fallback")]
    pub remote_fallback: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_remote_fallback() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            remote_fallback: default_remote_fallback(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ServiceConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded service config");
        Ok(config)
    }
}
