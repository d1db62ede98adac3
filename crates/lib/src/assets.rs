//! Read-only asset store for workflows bundled into the binary.
//!
//! Layout mirrors `crates/lib/assets/`: `workflow/*.js` holds runnable workflows, `tools/` holds
//! helper scripts. A bare `name.js` is looked up under `workflow/`.

use include_dir::{include_dir, Dir};

static BUNDLED_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");

/// Embedded namespaces a nested identifier may address.
pub const NAMESPACES: &[&str] = &["workflow/", "tools/"];

/// Read-only access to embedded resources.
pub trait AssetStore: Send + Sync {
    fn read_to_string(&self, path: &str) -> Option<String>;

    fn exists(&self, path: &str) -> bool {
        self.read_to_string(path).is_some()
    }

    /// Sorted names of the bundled workflows (file names under `workflow/`).
    fn list_workflow_names(&self) -> Vec<String>;
}

/// True if `identifier` may be looked up in the asset store: no separators at all, or rooted in
/// one of the [`NAMESPACES`].
pub fn is_eligible(identifier: &str) -> bool {
    let normalized = identifier.replace('\\', "/");
    !normalized.contains('/') || NAMESPACES.iter().any(|ns| normalized.starts_with(ns))
}

/// The asset store compiled in from `crates/lib/assets`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedAssets;

impl EmbeddedAssets {
    fn locate(path: &str) -> Option<&'static include_dir::File<'static>> {
        let path = path.replace('\\', "/");
        let path = path.trim_start_matches('/');
        if !path.contains('/') {
            if let Some(f) = BUNDLED_ASSETS.get_file(format!("workflow/{}", path)) {
                return Some(f);
            }
        }
        BUNDLED_ASSETS.get_file(path)
    }
}

impl AssetStore for EmbeddedAssets {
    fn read_to_string(&self, path: &str) -> Option<String> {
        Self::locate(path)
            .and_then(|f| f.contents_utf8())
            .map(str::to_string)
    }

    fn list_workflow_names(&self) -> Vec<String> {
        let Some(dir) = BUNDLED_ASSETS.get_dir("workflow") else {
            return Vec::new();
        };
        let mut names: Vec<String> = dir
            .files()
            .filter_map(|f| f.path().file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".js"))
            .collect();
        names.sort();
        names
    }
}
