//! Line-oriented permission files: one entry per line, `#` comment lines and blank lines ignored.

use anyhow::{Context, Result};
use std::path::Path;

/// Parse entries from file content, trimming whitespace and dropping exact duplicates.
pub fn parse_entries(content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !out.iter().any(|e| e == line) {
            out.push(line.to_string());
        }
    }
    out
}

/// Read entries from `path`. Missing file => no entries.
pub fn read_entries(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        log::debug!("permission file not found: {}", path.display());
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading permission file {}", path.display()))?;
    Ok(parse_entries(&content))
}

/// Rewrite `path` with `header` (each line already `#`-prefixed) followed by `entries`.
pub fn write_entries(path: &Path, header: &str, entries: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let mut content = String::from(header);
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for entry in entries {
        content.push_str(entry);
        content.push('\n');
    }
    std::fs::write(path, content)
        .with_context(|| format!("writing permission file {}", path.display()))
}

/// Append `entries` under a `# comment` line, leaving existing content untouched.
pub fn append_entries(path: &Path, comment: &str, entries: &[String]) -> Result<()> {
    use std::io::Write;

    if entries.is_empty() {
        return Ok(());
    }
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    let mut block = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        block.push('\n');
    }
    block.push_str("# ");
    block.push_str(comment);
    block.push('\n');
    for entry in entries {
        block.push_str(entry);
        block.push('\n');
    }
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening permission file {}", path.display()))?;
    f.write_all(block.as_bytes())
        .with_context(|| format!("appending to permission file {}", path.display()))
}
