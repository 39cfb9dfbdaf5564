//! Engine configuration
//!
//! Values are layered: built-in defaults, then a TOML file, then the
//! `AQUAPI_PLUGIN_DIR` / `AQUAPI_RASTERS_PATH` environment variables, then
//! whatever the caller overrides explicitly (the CLI's `--root`).
//!
//! ```toml
//! plugin_dir = "/opt/aquapi"
//! rasters_path = "rasters"
//!
//! [nodata]
//! policy = "sentinel"
//! value = -9999.0
//! ```

use aquapi_core::{Error, NodataPolicy, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_PLUGIN_DIR: &str = "AQUAPI_PLUGIN_DIR";
pub const ENV_RASTERS_PATH: &str = "AQUAPI_RASTERS_PATH";

/// Settings the indicator engine is built from
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Base directory of the installation
    pub plugin_dir: PathBuf,
    /// Raster store subpath, joined onto `plugin_dir`
    pub rasters_path: PathBuf,
    /// How raw cell values are recognised as no-data
    pub nodata: NodataPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from("."),
            rasters_path: PathBuf::from("rasters"),
            nodata: NodataPolicy::Negative,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text; missing keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config {
            key: "file".to_string(),
            reason: format!("Failed to parse TOML: {}", e.message()),
        })
    }

    /// Load a configuration file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::Config {
            key: "file".to_string(),
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        let config = Self::from_toml(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Override from the process environment.
    pub fn load_from_env(self) -> Self {
        self.load_from_lookup(|key| env::var(key).ok())
    }

    /// Override from an arbitrary variable lookup. Empty values are ignored.
    pub fn load_from_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_PLUGIN_DIR).filter(|v| !v.is_empty()) {
            tracing::debug!("{} overrides plugin_dir", ENV_PLUGIN_DIR);
            self.plugin_dir = PathBuf::from(dir);
        }
        if let Some(sub) = lookup(ENV_RASTERS_PATH).filter(|v| !v.is_empty()) {
            tracing::debug!("{} overrides rasters_path", ENV_RASTERS_PATH);
            self.rasters_path = PathBuf::from(sub);
        }
        self
    }

    /// Replace the raster store subpath.
    pub fn with_rasters_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rasters_path = path.into();
        self
    }

    pub fn with_nodata(mut self, policy: NodataPolicy) -> Self {
        self.nodata = policy;
        self
    }
}
