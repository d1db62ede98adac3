//! `fs` namespace. Every call that touches the filesystem (and `abs`/`rel`, which expose
//! resolved locations) runs the path safety check first. Relative paths resolve against the
//! session working directory. The pure path helpers (`join`, `split`, `ext`, ...) do no I/O and
//! are not gated.

use serde::Serialize;
use std::path::Path;

use super::{Content, Data, Files, Outcome, PathValue, Size, WorkingDir};
use crate::filesystem::{self, FileInfo};
use crate::policy::{self, PolicyError};

/// `fs.split` result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SplitPath {
    pub dir: String,
    pub file: String,
}

#[derive(Clone)]
pub struct FsCapability {
    cwd: WorkingDir,
}

impl FsCapability {
    pub fn new(cwd: WorkingDir) -> Self {
        Self { cwd }
    }

    fn checked(&self, path: &str) -> Result<std::path::PathBuf, PolicyError> {
        policy::path::check(path)?;
        Ok(self.cwd.resolve(path))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.checked(path).is_ok_and(|p| filesystem::exists(&p))
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.checked(path).is_ok_and(|p| filesystem::is_file(&p))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.checked(path).is_ok_and(|p| filesystem::is_dir(&p))
    }

    pub fn info(&self, path: &str) -> Outcome<Data<FileInfo>> {
        self.with_path(path, |p| filesystem::info(p).map(|data| Data { data }))
    }

    pub fn list(&self, dir: &str) -> Outcome<Files<FileInfo>> {
        self.with_path(dir, |p| filesystem::list(p).map(|files| Files { files }))
    }

    pub fn mkdir(&self, dir: &str) -> Outcome<()> {
        self.unit(dir, filesystem::make_dir)
    }

    pub fn read(&self, path: &str) -> Outcome<Content> {
        self.with_path(path, |p| {
            filesystem::read_file(p).map(|content| Content { content })
        })
    }

    pub fn write(&self, path: &str, content: &str) -> Outcome<()> {
        self.unit(path, |p| filesystem::write_file(p, content))
    }

    pub fn append(&self, path: &str, content: &str) -> Outcome<()> {
        self.unit(path, |p| filesystem::append_file(p, content))
    }

    pub fn copy(&self, src: &str, dst: &str) -> Outcome<()> {
        self.pair(src, dst, filesystem::copy)
    }

    pub fn move_path(&self, src: &str, dst: &str) -> Outcome<()> {
        self.pair(src, dst, filesystem::move_path)
    }

    pub fn remove(&self, path: &str) -> Outcome<()> {
        self.unit(path, filesystem::remove)
    }

    pub fn size(&self, path: &str) -> Outcome<Size> {
        self.with_path(path, |p| filesystem::size(p).map(|size| Size { size }))
    }

    pub fn find(&self, root: &str, pattern: &str) -> Outcome<Files<String>> {
        self.with_path(root, |p| {
            filesystem::find(p, pattern).map(|files| Files { files })
        })
    }

    pub fn cwd(&self) -> Outcome<PathValue> {
        Outcome::ok(PathValue {
            path: self.cwd.get().display().to_string(),
        })
    }

    /// Move the session working directory. The host process directory is untouched.
    pub fn chdir(&self, path: &str) -> Outcome<()> {
        let target = match self.checked(path) {
            Ok(p) => p,
            Err(e) => return Outcome::fail(e),
        };
        if !target.is_dir() {
            return Outcome::fail(format!("path is not a directory: {}", target.display()));
        }
        self.cwd.set(policy::path::clean(&target));
        Outcome::done()
    }

    pub fn abs(&self, path: &str) -> Outcome<PathValue> {
        if let Err(e) = policy::path::check(path) {
            return Outcome::fail(e);
        }
        let abs = filesystem::absolute(&self.cwd.get(), Path::new(path));
        Outcome::ok(PathValue {
            path: abs.display().to_string(),
        })
    }

    pub fn rel(&self, base: &str, target: &str) -> Outcome<PathValue> {
        for p in [base, target] {
            if let Err(e) = policy::path::check(p) {
                return Outcome::fail(e);
            }
        }
        let cwd = self.cwd.get();
        let base = filesystem::absolute(&cwd, Path::new(base));
        let target = filesystem::absolute(&cwd, Path::new(target));
        Outcome::from_result(filesystem::relative(&base, &target).map(|p| PathValue {
            path: p.display().to_string(),
        }))
    }

    pub fn join(&self, elements: &[String]) -> String {
        filesystem::join(elements)
    }

    pub fn split(&self, path: &str) -> SplitPath {
        let (dir, file) = filesystem::split(path);
        SplitPath { dir, file }
    }

    pub fn ext(&self, path: &str) -> String {
        filesystem::extension(path)
    }

    pub fn filename(&self, path: &str) -> String {
        filesystem::file_name(path)
    }

    pub fn basename(&self, path: &str) -> String {
        filesystem::base_name(path)
    }

    pub fn dirname(&self, path: &str) -> String {
        filesystem::dir_name(path)
    }

    fn with_path<T>(
        &self,
        path: &str,
        op: impl FnOnce(&Path) -> anyhow::Result<T>,
    ) -> Outcome<T> {
        match self.checked(path) {
            Ok(p) => Outcome::from_result(op(&p)),
            Err(e) => Outcome::fail(e),
        }
    }

    fn unit(&self, path: &str, op: impl FnOnce(&Path) -> anyhow::Result<()>) -> Outcome<()> {
        match self.checked(path) {
            Ok(p) => Outcome::from_unit(op(&p)),
            Err(e) => Outcome::fail(e),
        }
    }

    fn pair(
        &self,
        src: &str,
        dst: &str,
        op: impl FnOnce(&Path, &Path) -> anyhow::Result<()>,
    ) -> Outcome<()> {
        match (self.checked(src), self.checked(dst)) {
            (Ok(s), Ok(d)) => Outcome::from_unit(op(&s, &d)),
            (Err(e), _) | (_, Err(e)) => Outcome::fail(e),
        }
    }
}
