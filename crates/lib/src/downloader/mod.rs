//! Workflow installation from allowed remote sources, and listing of installed workflows.
//!
//! This runs outside the sandbox: it is invoked by the CLI's `workflow` commands, never by a
//! script. Downloads land in a temporary file inside the destination directory, are checked for
//! the workflow marker, and only then renamed into place.

pub mod sources;
pub mod url;

use anyhow::Context;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assets::{AssetStore, EmbeddedAssets};
use crate::config::WorkflowDirectoryProvider;
use crate::network::{format_bytes, DownloadProgress, NetworkClient};
use crate::policy::{NetworkAllowList, PolicyError};
use crate::script::{self, EXTENSION};

pub use self::sources::{SourceList, DEFAULT_SOURCES};

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("URL validation failed: {0}")]
    NotAllowed(#[from] PolicyError),
    #[error("could not extract filename from URL: {0}")]
    NoFilename(String),
    #[error("download failed: {0}")]
    Fetch(String),
    #[error("both original and mirror download failed: original={original}, mirror={mirror}")]
    MirrorFailed { original: String, mirror: String },
    #[error("downloaded file is not a valid amo workflow (must start with //!amo)")]
    InvalidWorkflow,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Transfers one URL into a local file.
#[async_trait]
pub trait ScriptFetcher: Send + Sync {
    /// Download `url` into `dest`, replacing it. Errors are human-readable.
    async fn fetch(&self, url: &::url::Url, dest: &Path) -> Result<(), String>;
}

/// [`ScriptFetcher`] over the allow-list-checked HTTP client, with a progress line on stderr.
pub struct HttpFetcher {
    client: NetworkClient,
}

impl HttpFetcher {
    pub fn new(allow: NetworkAllowList) -> anyhow::Result<Self> {
        Ok(Self {
            client: NetworkClient::new(allow)?,
        })
    }
}

#[async_trait]
impl ScriptFetcher for HttpFetcher {
    async fn fetch(&self, url: &::url::Url, dest: &Path) -> Result<(), String> {
        let mut last_pct: Option<u8> = None;
        let mut draw = |p: DownloadProgress| {
            let line = match (p.percentage(), p.total) {
                (Some(pct), Some(total)) => {
                    if last_pct == Some(pct) {
                        return;
                    }
                    last_pct = Some(pct);
                    format!(
                        "\rFetching script... {:3}% ({}/{})",
                        pct,
                        format_bytes(p.downloaded),
                        format_bytes(total)
                    )
                }
                _ => format!("\rFetching script... {}", format_bytes(p.downloaded)),
            };
            let mut err = std::io::stderr().lock();
            let _ = err.write_all(line.as_bytes());
            let _ = err.flush();
        };
        let res = self
            .client
            .download_file(
                url.as_str(),
                dest,
                Some(&mut draw as &mut (dyn FnMut(DownloadProgress) + Send)),
            )
            .await;
        eprintln!();
        match res.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Installs and lists workflows.
pub struct WorkflowDownloader {
    dirs: Arc<dyn WorkflowDirectoryProvider>,
    sources: SourceList,
    fetcher: Option<Arc<dyn ScriptFetcher>>,
    assets: Arc<dyn AssetStore>,
}

impl WorkflowDownloader {
    pub fn new(dirs: Arc<dyn WorkflowDirectoryProvider>, sources: SourceList) -> Self {
        Self {
            dirs,
            sources,
            fetcher: None,
            assets: Arc::new(EmbeddedAssets),
        }
    }

    /// Replace the HTTP transfer, e.g. with an in-memory fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ScriptFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_assets(mut self, assets: Arc<dyn AssetStore>) -> Self {
        self.assets = assets;
        self
    }

    pub fn sources(&self) -> &SourceList {
        &self.sources
    }

    /// Download `url` into the default workflow directory and return the installed path.
    ///
    /// The URL must match an allowed source before anything is fetched. GitHub downloads that
    /// fail are retried once against the mirror host, if it is itself allowed.
    pub async fn download_workflow(
        &self,
        url: &str,
        filename: Option<&str>,
    ) -> Result<PathBuf, DownloadError> {
        let allow = self.sources.allowlist()?;
        let parsed = allow.check_url(url)?;
        let raw = self::url::to_raw_url(&parsed);
        if raw != parsed {
            log::debug!("rewrote {} to {}", parsed, raw);
        }
        let filename = self::url::target_filename(&raw, filename)
            .ok_or_else(|| DownloadError::NoFilename(raw.to_string()))?;

        let dir = self.dirs.default_workflows_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating workflows directory {}", dir.display()))?;
        let temp = dir.join(self::url::temp_name(&filename, raw.as_str()));

        let fetcher: Arc<dyn ScriptFetcher> = match &self.fetcher {
            Some(f) => Arc::clone(f),
            None => Arc::new(HttpFetcher::new(allow.clone())?),
        };

        if let Err(e) = self.fetch_with_mirror(fetcher.as_ref(), &allow, &raw, &temp).await {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }

        let content = std::fs::read_to_string(&temp);
        let valid = content.as_deref().map(script::has_marker).unwrap_or(false);
        if !valid {
            let _ = std::fs::remove_file(&temp);
            return Err(DownloadError::InvalidWorkflow);
        }

        let target = dir.join(&filename);
        if let Err(e) = std::fs::rename(&temp, &target) {
            log::debug!("rename failed ({}), copying instead", e);
            let copied = std::fs::copy(&temp, &target);
            let _ = std::fs::remove_file(&temp);
            copied.with_context(|| format!("saving workflow file {}", target.display()))?;
        }
        log::info!("installed workflow {} from {}", target.display(), raw);
        Ok(target)
    }

    async fn fetch_with_mirror(
        &self,
        fetcher: &dyn ScriptFetcher,
        allow: &NetworkAllowList,
        raw: &::url::Url,
        temp: &Path,
    ) -> Result<(), DownloadError> {
        let original = match fetcher.fetch(raw, temp).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if !self::url::is_code_host(raw) {
            return Err(DownloadError::Fetch(original));
        }
        let Some(mirror) = self::url::mirror_url(raw) else {
            return Err(DownloadError::MirrorFailed {
                original,
                mirror: format!("unsupported GitHub URL format: {}", raw),
            });
        };
        if let Err(e) = allow.check_url(mirror.as_str()) {
            return Err(DownloadError::MirrorFailed {
                original,
                mirror: e.to_string(),
            });
        }
        log::warn!("download from {} failed ({}); trying mirror {}", raw, original, mirror);
        fetcher
            .fetch(&mirror, temp)
            .await
            .map_err(|mirror| DownloadError::MirrorFailed { original, mirror })
    }

    /// Sorted, de-duplicated `.js` file names across the default and configured directories.
    pub fn list_user_workflows(&self) -> anyhow::Result<Vec<String>> {
        let mut names = BTreeSet::new();
        let default_dir = self.dirs.default_workflows_dir();
        collect_scripts(&default_dir, &mut names)?;
        if let Some(configured) = self.dirs.configured_workflows_dir() {
            if configured != default_dir {
                collect_scripts(&configured, &mut names)?;
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Names of the workflows bundled into the binary.
    pub fn list_embedded_workflows(&self) -> Vec<String> {
        self.assets.list_workflow_names()
    }
}

fn collect_scripts(dir: &Path, names: &mut BTreeSet<String>) -> anyhow::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let suffix = format!(".{}", EXTENSION);
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading workflows directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("reading workflows directory {}", dir.display()))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.to_ascii_lowercase().ends_with(&suffix) {
            names.insert(name);
        }
    }
    Ok(())
}
