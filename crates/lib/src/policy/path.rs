//! Path safety check for filesystem capability arguments.
//!
//! The path is cleaned lexically (`.` dropped, `a/..` collapsed, `..` above a root dropped) and
//! rejected if a parent-directory segment survives. This blocks relative escapes only; it is
//! not a jail.

use std::path::{Component, Path, PathBuf};

use super::PolicyError;

/// Lexically clean `path` without touching the filesystem.
pub fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Reject `path` if its cleaned form still climbs above its starting point.
pub fn check(path: &str) -> Result<(), PolicyError> {
    let cleaned = clean(Path::new(path));
    if cleaned
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(PolicyError::PathTraversal(path.to_string()));
    }
    Ok(())
}
