//! Workflow script source and its structural marker.

use std::fmt;

/// Every workflow must begin with this line (after leading whitespace).
pub const MARKER: &str = "//!amo";

/// Conventional workflow file extension, appended when a bare identifier is not found.
pub const EXTENSION: &str = "js";

/// True if `text` starts with [`MARKER`] once leading whitespace is trimmed.
pub fn has_marker(text: &str) -> bool {
    text.trim_start().starts_with(MARKER)
}

/// Which location satisfied a script lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// The identifier read as a path relative to the process working directory (or absolute).
    Literal,
    /// The user-configured workflow directory.
    ConfiguredDir,
    /// The default directory downloaded workflows are installed into.
    DefaultDir,
    /// Workflows bundled into the binary.
    Embedded,
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionTier::Literal => "path",
            ResolutionTier::ConfiguredDir => "configured workflow directory",
            ResolutionTier::DefaultDir => "default workflow directory",
            ResolutionTier::Embedded => "embedded",
        };
        f.write_str(s)
    }
}

/// Resolved script text plus where it came from.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    /// Identifier as the caller gave it.
    pub identifier: String,
    pub text: String,
    pub tier: ResolutionTier,
}

impl ScriptSource {
    pub fn has_marker(&self) -> bool {
        has_marker(&self.text)
    }
}
