//! Allowed workflow sources: hosts (or `host/path` prefixes) `workflow get` may download from.
//! Entries use the same matching rules as the network allow-list.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::policy::{listfile, NetworkAllowList, PolicyError};

pub const DEFAULT_SOURCES: &[&str] = &[
    "github.com",
    "raw.githubusercontent.com",
    "gitlab.com",
    "bitbucket.org",
    "sourceforge.net",
    "toolchains.mirror.toulan.fun",
];

const HEADER: &str = "\
# Allowed workflow download sources - one domain or domain/path per line
# Matching rules:
# - 'github.com' allows github.com itself and any subdomain like api.github.com
# - 'github.com/owner' restricts to that owner only (and any subdomains)
# - 'api.github.com/v3' restricts to that path and below
";

/// The on-disk source list.
#[derive(Debug, Clone)]
pub struct SourceList {
    path: PathBuf,
}

impl SourceList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seed the file with [`DEFAULT_SOURCES`] if it does not exist yet.
    pub fn ensure(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        let defaults: Vec<String> = DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect();
        listfile::write_entries(&self.path, HEADER, &defaults)
    }

    /// Entries in file order.
    pub fn load(&self) -> Result<Vec<String>> {
        self.ensure()?;
        listfile::read_entries(&self.path)
    }

    pub fn allowlist(&self) -> Result<NetworkAllowList> {
        Ok(NetworkAllowList::new(self.load()?))
    }

    /// Sorted entries.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut entries = self.load()?;
        entries.sort();
        Ok(entries)
    }

    /// Add `entry` (lower-cased). Returns false if it was already present.
    pub fn add(&self, entry: &str) -> Result<bool> {
        let entry = normalize(entry)?;
        let mut entries = self.load()?;
        if entries.iter().any(|e| e.trim().eq_ignore_ascii_case(&entry)) {
            return Ok(false);
        }
        entries.push(entry);
        listfile::write_entries(&self.path, HEADER, &entries)?;
        Ok(true)
    }

    /// Remove `entry` (case-insensitive). Returns false if it was not present.
    pub fn remove(&self, entry: &str) -> Result<bool> {
        let entry = normalize(entry)?;
        let entries = self.load()?;
        let kept: Vec<String> = entries
            .iter()
            .filter(|e| !e.trim().eq_ignore_ascii_case(&entry))
            .cloned()
            .collect();
        if kept.len() == entries.len() {
            return Ok(false);
        }
        listfile::write_entries(&self.path, HEADER, &kept)?;
        Ok(true)
    }
}

fn normalize(entry: &str) -> Result<String, PolicyError> {
    let entry = entry.trim().to_ascii_lowercase();
    if entry.is_empty() || entry.starts_with('#') {
        return Err(PolicyError::InvalidEntry(entry));
    }
    Ok(entry)
}
