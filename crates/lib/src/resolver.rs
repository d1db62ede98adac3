//! Script resolution: find workflow source text for an identifier.
//!
//! Tiers, in order: the identifier as a literal path, the configured workflow directory, the
//! default workflow directory, then the embedded assets (eligible names only). Nested relative
//! identifiers are tried against each directory as a whole relative path. When nothing matches
//! and the identifier has no extension, the lookup is retried once with `.js` appended.
//! Nothing is cached; every run re-reads from disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assets::{self, AssetStore};
use crate::config::WorkflowDirectoryProvider;
use crate::engine::EngineError;
use crate::policy;
use crate::script::{ResolutionTier, ScriptSource, EXTENSION};

/// Locates workflow scripts across the resolution tiers.
#[derive(Clone)]
pub struct ScriptResolver {
    dirs: Arc<dyn WorkflowDirectoryProvider>,
    assets: Option<Arc<dyn AssetStore>>,
}

impl ScriptResolver {
    pub fn new(
        dirs: Arc<dyn WorkflowDirectoryProvider>,
        assets: Option<Arc<dyn AssetStore>>,
    ) -> Self {
        Self { dirs, assets }
    }

    /// Resolve `identifier` to source text, or `EngineError::NotFound` naming it.
    pub fn resolve(&self, identifier: &str) -> Result<ScriptSource, EngineError> {
        if let Some(found) = self.lookup(identifier) {
            return Ok(self.finish(identifier, found));
        }
        if Path::new(identifier).extension().is_none() && !identifier.is_empty() {
            let with_ext = format!("{}.{}", identifier, EXTENSION);
            if let Some(found) = self.lookup(&with_ext) {
                return Ok(self.finish(identifier, found));
            }
        }
        Err(EngineError::NotFound {
            identifier: identifier.to_string(),
        })
    }

    fn finish(&self, identifier: &str, (text, tier): (String, ResolutionTier)) -> ScriptSource {
        log::debug!("resolved workflow {} from {}", identifier, tier);
        ScriptSource {
            identifier: identifier.to_string(),
            text,
            tier,
        }
    }

    fn lookup(&self, identifier: &str) -> Option<(String, ResolutionTier)> {
        if identifier.trim().is_empty() {
            return None;
        }
        if let Some(text) = read_script(Path::new(identifier)) {
            return Some((text, ResolutionTier::Literal));
        }

        let relative = relative_path(identifier)?;
        if let Some(dir) = self.dirs.configured_workflows_dir() {
            if let Some(text) = read_script(&dir.join(&relative)) {
                return Some((text, ResolutionTier::ConfiguredDir));
            }
        }
        if let Some(text) = read_script(&self.dirs.default_workflows_dir().join(&relative)) {
            return Some((text, ResolutionTier::DefaultDir));
        }

        let assets = self.assets.as_ref()?;
        if assets::is_eligible(identifier) {
            if let Some(text) = assets.read_to_string(&identifier.replace('\\', "/")) {
                return Some((text, ResolutionTier::Embedded));
            }
        }
        None
    }
}

/// Platform path for a relative identifier. `None` for absolute identifiers and for ones that
/// would climb out of the directory they are joined to.
fn relative_path(identifier: &str) -> Option<PathBuf> {
    let path: PathBuf = identifier
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect();
    let absolute = identifier.starts_with(['/', '\\']) || Path::new(identifier).is_absolute();
    if absolute || path.as_os_str().is_empty() || policy::path::check(identifier).is_err() {
        return None;
    }
    Some(path)
}

fn read_script(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            log::debug!("cannot read script {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Paths, UserConfig};

    struct Fixture {
        base: PathBuf,
        configured: PathBuf,
        default: PathBuf,
    }

    fn fixture() -> Fixture {
        let base =
            std::env::temp_dir().join(format!("amo-resolver-test-{}", uuid::Uuid::new_v4()));
        let configured = base.join("mine");
        let default = base.join("workflows");
        std::fs::create_dir_all(&configured).unwrap();
        std::fs::create_dir_all(&default).unwrap();
        Fixture {
            base,
            configured,
            default,
        }
    }

    fn resolver(f: &Fixture) -> ScriptResolver {
        let user = UserConfig::new(
            Paths::new(&f.base),
            Config::default(),
            Some(f.configured.clone()),
        );
        ScriptResolver::new(Arc::new(user), Some(Arc::new(crate::assets::EmbeddedAssets)))
    }

    fn write(path: &Path, text: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn configured_dir_wins_over_default_dir() {
        let f = fixture();
        write(&f.configured.join("x-unique.js"), "//!amo\n// configured");
        write(&f.default.join("x-unique.js"), "//!amo\n// default");
        let found = resolver(&f).resolve("x-unique.js").unwrap();
        assert_eq!(found.tier, ResolutionTier::ConfiguredDir);
        assert!(found.text.contains("configured"));
    }

    #[test]
    fn default_dir_is_used_when_configured_misses() {
        let f = fixture();
        write(&f.default.join("only-default.js"), "//!amo\n");
        let found = resolver(&f).resolve("only-default.js").unwrap();
        assert_eq!(found.tier, ResolutionTier::DefaultDir);
    }

    #[test]
    fn literal_path_comes_first() {
        let f = fixture();
        let literal = f.base.join("direct.js");
        write(&literal, "//!amo\n// literal");
        let found = resolver(&f).resolve(literal.to_str().unwrap()).unwrap();
        assert_eq!(found.tier, ResolutionTier::Literal);
    }

    #[test]
    fn nested_relative_paths_search_directories() {
        let f = fixture();
        write(&f.configured.join("media").join("convert.js"), "//!amo\n");
        let found = resolver(&f).resolve("media/convert.js").unwrap();
        assert_eq!(found.tier, ResolutionTier::ConfiguredDir);
    }

    #[test]
    fn missing_extension_is_retried() {
        let f = fixture();
        write(&f.default.join("noext-flow.js"), "//!amo\n");
        let found = resolver(&f).resolve("noext-flow").unwrap();
        assert_eq!(found.identifier, "noext-flow");
        assert_eq!(found.tier, ResolutionTier::DefaultDir);
    }

    #[test]
    fn embedded_assets_are_last() {
        let f = fixture();
        let found = resolver(&f).resolve("hello").unwrap();
        assert_eq!(found.tier, ResolutionTier::Embedded);

        write(&f.default.join("hello.js"), "//!amo\n// shadowed");
        let found = resolver(&f).resolve("hello.js").unwrap();
        assert_eq!(found.tier, ResolutionTier::DefaultDir);
    }

    #[test]
    fn not_found_names_the_original_identifier() {
        let f = fixture();
        let err = resolver(&f).resolve("does-not-exist").unwrap_err();
        match err {
            EngineError::NotFound { identifier } => assert_eq!(identifier, "does-not-exist"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn traversal_identifiers_are_not_joined_to_directories() {
        assert!(relative_path("../outside.js").is_none());
        assert!(relative_path("/abs/flow.js").is_none());
        assert_eq!(
            relative_path("media\\convert.js"),
            Some(["media", "convert.js"].iter().collect::<PathBuf>())
        );
    }
}
