//! Configuration types and loading.
//!
//! Everything amo persists lives under one per-user base directory (`~/.amo` by default,
//! overridden by `AMO_HOME`): the optional `config.json`, the permission files that gate
//! subprocess and network access, the tool path cache, and the downloaded workflows.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Env var overriding the per-user base directory.
pub const HOME_ENV: &str = "AMO_HOME";
/// Env var overriding the configured workflow directory.
pub const WORKFLOWS_DIR_ENV: &str = "AMO_WORKFLOWS_DIR";

/// Top-level application config (`config.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// User-configured workflow directory, searched before the default download directory.
    /// Relative paths are resolved against the base directory. Overridden by AMO_WORKFLOWS_DIR.
    #[serde(default)]
    pub workflows: Option<PathBuf>,
}

/// Resolve the base directory from env or default. `None` when no home directory can be found
/// and `AMO_HOME` is unset.
pub fn default_base_dir() -> Option<PathBuf> {
    non_empty_env(HOME_ENV)
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".amo")))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Well-known files under the base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Paths rooted at [`default_base_dir`].
    pub fn from_env() -> Option<Self> {
        default_base_dir().map(Self::new)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Command whitelist: one bare command name per line.
    pub fn command_whitelist(&self) -> PathBuf {
        self.base.join("allowed_cli.txt")
    }

    /// Network allow-list: one `host` or `host/path-prefix` per line.
    pub fn network_allowlist(&self) -> PathBuf {
        self.base.join("allowed_hosts.txt")
    }

    /// Hosts that may supply workflow scripts to `workflow get`.
    pub fn workflow_sources(&self) -> PathBuf {
        self.base.join("allowed_workflow_hosts.txt")
    }

    /// Tool path cache written by the tool installer.
    pub fn tool_cache(&self) -> PathBuf {
        self.base.join("tool_paths.json")
    }

    /// Default directory for downloaded workflows.
    pub fn workflows_dir(&self) -> PathBuf {
        self.base.join("workflows")
    }
}

/// Load `config.json` from the base directory. Missing file => default config.
pub fn load_config(paths: &Paths) -> Result<Config> {
    let path = paths.config_file();
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}

/// Where workflow scripts live on disk. Injected into the resolver and the downloader so
/// neither reaches for the config store directly.
pub trait WorkflowDirectoryProvider: Send + Sync {
    /// User-configured workflow directory, if any.
    fn configured_workflows_dir(&self) -> Option<PathBuf>;

    /// Default directory that downloaded workflows are installed into.
    fn default_workflows_dir(&self) -> PathBuf;
}

/// Loaded config plus its base directory; the standard [`WorkflowDirectoryProvider`].
#[derive(Debug, Clone)]
pub struct UserConfig {
    pub paths: Paths,
    pub config: Config,
    workflows_override: Option<PathBuf>,
}

impl UserConfig {
    /// Build from already-loaded parts. `workflows_override` plays the role of AMO_WORKFLOWS_DIR.
    pub fn new(paths: Paths, config: Config, workflows_override: Option<PathBuf>) -> Self {
        Self {
            paths,
            config,
            workflows_override,
        }
    }

    /// Load `config.json` under `paths` and pick up AMO_WORKFLOWS_DIR from the environment.
    pub fn load(paths: Paths) -> Result<Self> {
        let config = load_config(&paths)?;
        let workflows_override = non_empty_env(WORKFLOWS_DIR_ENV).map(PathBuf::from);
        Ok(Self::new(paths, config, workflows_override))
    }
}

impl WorkflowDirectoryProvider for UserConfig {
    fn configured_workflows_dir(&self) -> Option<PathBuf> {
        let dir = self
            .workflows_override
            .clone()
            .or_else(|| self.config.workflows.clone())
            .filter(|p| !p.as_os_str().is_empty())?;
        if dir.is_absolute() {
            Some(dir)
        } else {
            Some(self.paths.base().join(dir))
        }
    }

    fn default_workflows_dir(&self) -> PathBuf {
        self.paths.workflows_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_base() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("amo-config-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let base = temp_base();
        let config = load_config(&Paths::new(&base)).unwrap();
        assert!(config.workflows.is_none());
    }

    #[test]
    fn relative_workflows_dir_resolves_against_base() {
        let base = temp_base();
        std::fs::write(base.join("config.json"), br#"{"workflows":"mine"}"#).unwrap();
        let paths = Paths::new(&base);
        let config = load_config(&paths).unwrap();
        let user = UserConfig::new(paths, config, None);
        assert_eq!(user.configured_workflows_dir(), Some(base.join("mine")));
        assert_eq!(user.default_workflows_dir(), base.join("workflows"));
    }

    #[test]
    fn override_wins_over_config_file() {
        let base = temp_base();
        let config = Config {
            workflows: Some(PathBuf::from("/from/config")),
        };
        let user = UserConfig::new(Paths::new(&base), config, Some(PathBuf::from("/from/env")));
        assert_eq!(user.configured_workflows_dir(), Some(PathBuf::from("/from/env")));
    }

    #[test]
    fn malformed_config_is_an_error() {
        let base = temp_base();
        std::fs::write(base.join("config.json"), b"{not json").unwrap();
        assert!(load_config(&Paths::new(&base)).is_err());
    }
}
