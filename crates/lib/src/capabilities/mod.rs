//! Host capability modules exposed to workflow scripts.
//!
//! Each module is a typed Rust API: it enforces its policy, performs the effect through a
//! collaborator, and returns a serializable result. The interpreter glue in `engine::js` only
//! converts arguments and results; it never decides anything.

pub mod cli;
pub mod clipboard;
pub mod encoding;
pub mod fs;
pub mod globals;
pub mod net;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use self::cli::{CliCapability, CliOptions, CliResult};
pub use self::clipboard::ClipboardCapability;
pub use self::fs::FsCapability;
pub use self::globals::{Console, MemoryConsole, StdConsole, Stream};
pub use self::net::{HttpResult, NetCapability};

/// Tagged capability result: `{success, ...data, error?}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }

    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(format!("{:#}", e)),
        }
    }
}

impl Outcome<()> {
    /// Success with no payload.
    pub fn done() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn from_unit<E: std::fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::done(),
            Err(e) => Self::fail(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Data<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Files<T> {
    pub files: Vec<T>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Content {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Text {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PathValue {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Size {
    pub size: u64,
}

/// Session-local working directory shared by `fs` and `cliCommand`.
/// `fs.chdir` moves it; the host process directory never changes.
#[derive(Debug, Clone)]
pub struct WorkingDir(Arc<Mutex<PathBuf>>);

impl WorkingDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self(Arc::new(Mutex::new(dir.into())))
    }

    /// Start from the process working directory.
    pub fn from_process() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn get(&self) -> PathBuf {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, dir: PathBuf) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = dir;
    }

    /// `path` joined onto the working directory unless already absolute.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.get().join(p)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_flat() {
        let ok = serde_json::to_value(Outcome::ok(Text { text: "hi".into() })).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "text": "hi"}));

        let failed = serde_json::to_value(Outcome::<Text>::fail("nope")).unwrap();
        assert_eq!(failed, serde_json::json!({"success": false, "error": "nope"}));

        let done = serde_json::to_value(Outcome::done()).unwrap();
        assert_eq!(done, serde_json::json!({"success": true}));
    }

    #[test]
    fn working_dir_resolves_relative_paths() {
        let wd = WorkingDir::new("/work");
        assert_eq!(wd.resolve("a.txt"), PathBuf::from("/work/a.txt"));
        assert_eq!(wd.resolve("/abs"), PathBuf::from("/abs"));
        wd.set(PathBuf::from("/other"));
        assert_eq!(wd.resolve("b"), PathBuf::from("/other/b"));
    }
}
