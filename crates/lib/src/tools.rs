//! Read-only view of the tool installer's path cache (`tool_paths.json`).
//!
//! Used as the secondary source when resolving a whitelisted command: after `PATH`, before
//! falling back to the bare name.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Looks up the last-known executable path for a command base name.
pub trait ToolPathProvider: Send + Sync {
    fn cached_tool_path(&self, name: &str) -> Option<PathBuf>;
}

/// On-disk shape of `tool_paths.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolPathCacheFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub paths: HashMap<String, PathBuf>,
}

/// Tool path cache loaded once per engine.
#[derive(Debug, Clone, Default)]
pub struct ToolPathCache {
    paths: HashMap<String, PathBuf>,
}

impl ToolPathCache {
    pub fn new(paths: HashMap<String, PathBuf>) -> Self {
        Self { paths }
    }

    /// Load the cache file. Missing file => empty cache.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading tool path cache {}", path.display()))?;
        let file: ToolPathCacheFile = serde_json::from_str(&s)
            .with_context(|| format!("parsing tool path cache {}", path.display()))?;
        log::debug!(
            "loaded {} cached tool path(s) (version {})",
            file.paths.len(),
            file.version
        );
        Ok(Self::new(file.paths))
    }
}

impl ToolPathProvider for ToolPathCache {
    fn cached_tool_path(&self, name: &str) -> Option<PathBuf> {
        self.paths.get(name).cloned()
    }
}
