//! Filesystem collaborator: synchronous file operations and lexical path helpers.
//!
//! Operations take already-resolved paths and return `anyhow::Result` with the failing path in
//! the context; the capability layer turns those into result values for scripts.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{is_separator, Component, Path, PathBuf};

use crate::policy::path::clean;

/// Metadata exposed to scripts by `fs.info` and `fs.list`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    /// RFC 3339 modification time.
    pub mod_time: String,
    /// `ls -l` style mode string, e.g. `-rw-r--r--`.
    pub mode: String,
}

fn file_info(path: &Path, meta: &std::fs::Metadata) -> FileInfo {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mod_time = meta
        .modified()
        .map(|t| chrono::DateTime::<chrono::Local>::from(t).to_rfc3339_opts(chrono::SecondsFormat::Secs, false))
        .unwrap_or_default();
    FileInfo {
        name,
        path: path.display().to_string(),
        size: meta.len(),
        is_dir: meta.is_dir(),
        mod_time,
        mode: mode_string(meta),
    }
}

#[cfg(unix)]
fn mode_string(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;

    let bits = meta.permissions().mode();
    let kind = if meta.is_dir() {
        'd'
    } else if meta.file_type().is_symlink() {
        'L'
    } else {
        '-'
    };
    let mut s = String::with_capacity(10);
    s.push(kind);
    for shift in [6u32, 3, 0] {
        let triple = (bits >> shift) & 0o7;
        s.push(if triple & 0o4 != 0 { 'r' } else { '-' });
        s.push(if triple & 0o2 != 0 { 'w' } else { '-' });
        s.push(if triple & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}

#[cfg(not(unix))]
fn mode_string(meta: &std::fs::Metadata) -> String {
    let kind = if meta.is_dir() { 'd' } else { '-' };
    if meta.permissions().readonly() {
        format!("{}r--r--r--", kind)
    } else {
        format!("{}rw-rw-rw-", kind)
    }
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

pub fn is_file(path: &Path) -> bool {
    path.is_file()
}

pub fn is_dir(path: &Path) -> bool {
    path.is_dir()
}

pub fn info(path: &Path) -> Result<FileInfo> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("failed to get file info for {}", path.display()))?;
    Ok(file_info(path, &meta))
}

/// Entries of `dir`, sorted by name. Unreadable entries are skipped.
pub fn list(dir: &Path) -> Result<Vec<FileInfo>> {
    if !dir.is_dir() {
        bail!("path is not a directory: {}", dir.display());
    }
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?;
    let mut files: Vec<FileInfo> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            let meta = std::fs::metadata(&path).ok()?;
            Some(file_info(&path, &meta))
        })
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

pub fn make_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))
}

pub fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read file {}", path.display()))
}

/// Write `content`, creating parent directories as needed.
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        make_dir(parent)?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write file {}", path.display()))
}

pub fn append_file(path: &Path, content: &str) -> Result<()> {
    use std::io::Write;

    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open file for append {}", path.display()))?;
    f.write_all(content.as_bytes())
        .with_context(|| format!("failed to append to file {}", path.display()))
}

/// Copy a file, or a directory recursively.
pub fn copy(src: &Path, dst: &Path) -> Result<()> {
    let meta = std::fs::metadata(src)
        .with_context(|| format!("failed to stat source {}", src.display()))?;
    if !meta.is_dir() {
        if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
            make_dir(parent)?;
        }
        std::fs::copy(src, dst).with_context(|| {
            format!("failed to copy {} to {}", src.display(), dst.display())
        })?;
        return Ok(());
    }
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.with_context(|| format!("failed to walk {}", src.display()))?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            make_dir(&target)?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!("failed to copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }
    Ok(())
}

/// Rename, falling back to copy + delete across filesystems.
pub fn move_path(src: &Path, dst: &Path) -> Result<()> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy(src, dst)?;
    remove(src)
}

/// Delete a file or directory tree. Missing paths are not an error.
pub fn remove(path: &Path) -> Result<()> {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return Ok(());
    };
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.with_context(|| format!("failed to delete {}", path.display()))
}

/// File size, or the total size of the files under a directory.
pub fn size(path: &Path) -> Result<u64> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("failed to get size for {}", path.display()))?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(path) {
        let entry = entry
            .with_context(|| format!("failed to calculate directory size for {}", path.display()))?;
        if entry.file_type().is_file() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok(total)
}

/// Paths under `root` (root included) whose file name matches the glob `pattern`.
pub fn find(root: &Path, pattern: &str) -> Result<Vec<String>> {
    if !root.exists() {
        bail!("root path does not exist: {}", root.display());
    }
    let matcher =
        glob::Pattern::new(pattern).with_context(|| format!("invalid pattern {}", pattern))?;
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to search in {}", root.display()))?;
        let name = entry.file_name().to_string_lossy();
        if matcher.matches(&name) {
            out.push(entry.path().display().to_string());
        }
    }
    Ok(out)
}

/// `path` made absolute against `base` and cleaned.
pub fn absolute(base: &Path, path: &Path) -> PathBuf {
    clean(&base.join(path))
}

/// Lexical relative path from `base` to `target`; both must be absolute or both relative.
pub fn relative(base: &Path, target: &Path) -> Result<PathBuf> {
    let base = clean(base);
    let target = clean(target);
    if base.is_absolute() != target.is_absolute() {
        bail!(
            "can't make {} relative to {}",
            target.display(),
            base.display()
        );
    }
    let b: Vec<Component<'_>> = base
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let t: Vec<Component<'_>> = target
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let common = b.iter().zip(&t).take_while(|(x, y)| x == y).count();
    if b[common..].iter().any(|c| matches!(c, Component::ParentDir))
    {
        bail!(
            "can't make {} relative to {}",
            target.display(),
            base.display()
        );
    }
    let mut out = PathBuf::new();
    for _ in common..b.len() {
        out.push("..");
    }
    for c in &t[common..] {
        out.push(c.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    Ok(out)
}

/// Join non-empty elements and clean the result. No elements => empty string.
pub fn join<S: AsRef<str>>(elements: &[S]) -> String {
    let joined: PathBuf = elements
        .iter()
        .map(AsRef::as_ref)
        .filter(|e| !e.is_empty())
        .collect();
    if joined.as_os_str().is_empty() {
        return String::new();
    }
    clean(&joined).display().to_string()
}

/// Split after the last separator: `("a/b/", "c.txt")`.
pub fn split(path: &str) -> (String, String) {
    match path.rfind(is_separator) {
        Some(i) => (path[..=i].to_string(), path[i + 1..].to_string()),
        None => (String::new(), path.to_string()),
    }
}

fn last_element(path: &str) -> &str {
    let trimmed = path.trim_end_matches(is_separator);
    match trimmed.rfind(is_separator) {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

/// Extension of the last element including its dot, or `""`.
pub fn extension(path: &str) -> String {
    let name = last_element(path);
    match name.rfind('.') {
        Some(i) => name[i..].to_string(),
        None => String::new(),
    }
}

/// Last element of `path`: `"."` for empty input, the separator for a bare root.
pub fn file_name(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let name = last_element(path);
    if name.is_empty() {
        return std::path::MAIN_SEPARATOR.to_string();
    }
    name.to_string()
}

/// Last element without its extension.
pub fn base_name(path: &str) -> String {
    let name = file_name(path);
    let ext = extension(&name);
    if ext.is_empty() || ext.len() == name.len() {
        return name;
    }
    name[..name.len() - ext.len()].to_string()
}

/// Everything but the last element, cleaned; `"."` when there is no directory part.
pub fn dir_name(path: &str) -> String {
    let (dir, _) = split(path);
    if dir.is_empty() {
        return ".".to_string();
    }
    clean(Path::new(&dir)).display().to_string()
}
