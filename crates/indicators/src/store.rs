//! Raster store location
//!
//! Raster names handed to the engine are relative to the store root, which
//! is `plugin_dir` joined with a subpath. Names are joined at call time, so
//! moving the root affects every later call.

use crate::config::EngineConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterStoreLocation {
    plugin_dir: PathBuf,
    subpath: PathBuf,
}

impl RasterStoreLocation {
    pub fn new(plugin_dir: impl Into<PathBuf>, subpath: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            subpath: subpath.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.plugin_dir, &config.rasters_path)
    }

    /// Current store root.
    pub fn root(&self) -> PathBuf {
        self.plugin_dir.join(&self.subpath)
    }

    /// Replace the subpath. An absolute path replaces the whole root.
    pub fn set_directory(&mut self, subpath: impl Into<PathBuf>) {
        self.subpath = subpath.into();
    }

    /// Resolve a raster name against the current root.
    pub fn resolve(&self, name: impl AsRef<Path>) -> PathBuf {
        self.root().join(name)
    }
}
