//! Initialize the per-user base directory: `config.json`, the workflows directory, and the
//! permission files.
//!
//! Seeding is idempotent. Existing files are left alone, except that default hosts missing from
//! the network allow-list are appended.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Paths;
use crate::downloader::SourceList;
use crate::policy::{commands, network};

/// Ensure the base directory has been initialized (config file exists).
pub fn require_initialized(paths: &Paths) -> Result<()> {
    let config_path = paths.config_file();
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `amo init` first (config file not found: {})",
            config_path.display()
        );
    }
    Ok(())
}

/// Create the base directory and default files if they do not exist.
/// - Writes `config.json` with `{}` if missing.
/// - Creates the default `workflows` directory.
/// - Writes the command whitelist template if missing.
/// - Creates or heals the network allow-list with the default hosts.
/// - Seeds the allowed workflow sources.
pub fn init_config_dir(paths: &Paths) -> Result<PathBuf> {
    let base = paths.base();
    std::fs::create_dir_all(base)
        .with_context(|| format!("creating config directory {}", base.display()))?;

    let config_path = paths.config_file();
    if !config_path.exists() {
        std::fs::write(&config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let workflows = paths.workflows_dir();
    if !workflows.exists() {
        std::fs::create_dir_all(&workflows)
            .with_context(|| format!("creating workflows directory {}", workflows.display()))?;
        log::info!("created workflows directory at {}", workflows.display());
    }

    seed_file(&paths.command_whitelist(), commands::DEFAULT_TEMPLATE)?;

    let added = network::heal_defaults(&paths.network_allowlist())?;
    if !added.is_empty() {
        log::debug!("network allow-list defaults added: {}", added.join(", "));
    }

    SourceList::new(paths.workflow_sources()).ensure()?;

    Ok(base.to_path_buf())
}

fn seed_file(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        log::debug!("{} already exists, skipping", path.display());
        return Ok(());
    }
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    log::info!("wrote default {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{CommandWhitelist, NetworkAllowList};

    #[test]
    fn seeds_everything_and_is_idempotent() {
        let base = std::env::temp_dir().join(format!("amo-init-test-{}", uuid::Uuid::new_v4()));
        let paths = Paths::new(&base);
        assert!(require_initialized(&paths).is_err());

        init_config_dir(&paths).unwrap();
        require_initialized(&paths).unwrap();
        assert!(paths.workflows_dir().is_dir());
        let whitelist = CommandWhitelist::load(&paths.command_whitelist()).unwrap();
        assert!(whitelist.check("echo").is_ok());
        let hosts = NetworkAllowList::load(&paths.network_allowlist()).unwrap();
        assert_eq!(hosts.entries().len(), network::DEFAULT_HOSTS.len());
        assert!(paths.workflow_sources().exists());

        std::fs::write(paths.command_whitelist(), "pandoc\n").unwrap();
        init_config_dir(&paths).unwrap();
        let whitelist = CommandWhitelist::load(&paths.command_whitelist()).unwrap();
        assert!(whitelist.check("echo").is_err());
    }

    #[test]
    fn heals_missing_default_hosts() {
        let base = std::env::temp_dir().join(format!("amo-init-test-{}", uuid::Uuid::new_v4()));
        let paths = Paths::new(&base);
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(paths.network_allowlist(), "example.com\n").unwrap();

        init_config_dir(&paths).unwrap();
        let hosts = NetworkAllowList::load(&paths.network_allowlist()).unwrap();
        assert!(hosts.entries().contains(&"example.com".to_string()));
        assert!(hosts.entries().contains(&"github.com".to_string()));
    }
}
