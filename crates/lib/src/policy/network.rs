//! Network allow-list: `host` or `host/path-prefix` entries gating outbound HTTP.
//!
//! A bare `host` matches the host itself and any subdomain. A `host/prefix` entry also requires
//! the URL path to start with `/prefix` at a segment boundary: the path equals the prefix, the
//! next path character is `/`, or the prefix itself ends with `/`.

use anyhow::Result;
use std::path::Path;
use url::Url;

use super::listfile;
use super::PolicyError;

/// Hosts seeded into a fresh allow-list and re-added when missing.
pub const DEFAULT_HOSTS: &[&str] = &[
    "github.com",
    "raw.githubusercontent.com",
    "gitlab.com",
    "bitbucket.org",
    "sourceforge.net",
    "ffmpeg.org",
    "imagemagick.org",
    "calibre-ebook.com",
    "ghostscript.com",
    "toolchains.mirror.toulan.fun",
];

pub const HEADER: &str = "\
# Allowed hosts for network access - one domain or domain/path per line
# Matching rules:
# - \"github.com\" matches github.com and any subdomain such as api.github.com, with any path
# - \"github.com/nodewee\" matches github.com/nodewee and paths under it (github.com/nodewee/project)
#   but not github.com/nodeweexyz
# - An empty list denies all network access
";

const ALLOWED_SCHEMES: &[&str] = &["https", "http"];

/// One parsed allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowEntry {
    host: String,
    /// Path prefix including its leading `/`.
    path: Option<String>,
}

impl AllowEntry {
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() || entry.starts_with('#') {
            return None;
        }
        let (host, path) = match entry.split_once('/') {
            Some((host, rest)) => (host, Some(format!("/{}", rest))),
            None => (entry, None),
        };
        if host.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_ascii_lowercase(),
            path,
        })
    }

    pub fn matches(&self, host: &str, url_path: &str) -> bool {
        let host_matches = host == self.host
            || host
                .strip_suffix(self.host.as_str())
                .is_some_and(|rest| rest.ends_with('.'));
        if !host_matches {
            return false;
        }
        let Some(prefix) = &self.path else {
            return true;
        };
        url_path.starts_with(prefix.as_str())
            && (url_path.len() == prefix.len()
                || url_path.as_bytes()[prefix.len()] == b'/'
                || prefix.ends_with('/'))
    }
}

/// Ordered list of allow entries. Empty => deny all.
#[derive(Debug, Clone, Default)]
pub struct NetworkAllowList {
    raw: Vec<String>,
    entries: Vec<AllowEntry>,
}

impl NetworkAllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for e in entries {
            let e = e.as_ref().trim();
            if let Some(parsed) = AllowEntry::parse(e) {
                if !list.entries.contains(&parsed) {
                    list.raw.push(e.to_string());
                    list.entries.push(parsed);
                }
            }
        }
        list
    }

    /// Read the allow-list file. Missing file => empty (deny all).
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(listfile::read_entries(path)?))
    }

    /// Entries as written in the file.
    pub fn entries(&self) -> &[String] {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn allows(&self, host: &str, url_path: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.entries.iter().any(|e| e.matches(&host, url_path))
    }

    /// Parse `url`, require http(s), and require an allow-list match.
    pub fn check_url(&self, url: &str) -> Result<Url, PolicyError> {
        let parsed = Url::parse(url).map_err(|e| PolicyError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
            return Err(PolicyError::SchemeNotAllowed {
                url: url.to_string(),
                scheme: parsed.scheme().to_string(),
            });
        }
        let host = parsed.host_str().unwrap_or_default();
        if !self.allows(host, parsed.path()) {
            return Err(PolicyError::UrlNotAllowed(url.to_string()));
        }
        Ok(parsed)
    }
}

/// Append any [`DEFAULT_HOSTS`] missing from the file at `path`, creating it with a header when
/// absent. Returns the hosts that were added.
pub fn heal_defaults(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        let defaults: Vec<String> = DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect();
        listfile::write_entries(path, HEADER, &defaults)?;
        return Ok(defaults);
    }
    let existing = listfile::read_entries(path)?;
    let missing: Vec<String> = DEFAULT_HOSTS
        .iter()
        .filter(|h| !existing.iter().any(|e| e == *h))
        .map(|h| h.to_string())
        .collect();
    if !missing.is_empty() {
        listfile::append_entries(path, "Auto-added default hosts", &missing)?;
        log::info!(
            "added {} default host(s) to {}",
            missing.len(),
            path.display()
        );
    }
    Ok(missing)
}
