//! Workspace root discovery and package naming.

use std::path::{Component, Path, PathBuf};

use crate::build;
use crate::error::Error;

/// Files that mark the root of a Bazel workspace.
pub const WORKSPACE_MARKERS: &[&str] = &["WORKSPACE", "WORKSPACE.bazel", "MODULE.bazel"];

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Find the closest directory at or above `start` holding a workspace
    /// marker.
    pub fn find(start: &Path) -> Result<Self, Error> {
        let start = canonical(start)?;
        let mut dir = if start.is_dir() {
            start.as_path()
        } else {
            start.parent().ok_or_else(|| Error::WorkspaceNotFound(start.clone()))?
        };
        loop {
            if WORKSPACE_MARKERS.iter().any(|m| dir.join(m).is_file()) {
                return Ok(Self {
                    root: dir.to_path_buf(),
                });
            }
            dir = dir
                .parent()
                .ok_or_else(|| Error::WorkspaceNotFound(start.clone()))?;
        }
    }

    /// A workspace rooted at `root`, which must be canonical.
    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workspace-relative path of `path` with `/` separators; `""` for the
    /// root itself. `None` outside the workspace.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(parts.join("/"))
    }

    /// Package name of a directory inside the workspace.
    pub fn package_of(&self, dir: &Path) -> Result<String, Error> {
        self.relative(dir)
            .ok_or_else(|| Error::OutsideWorkspace(dir.to_path_buf()))
    }

    pub fn dir_of(&self, package: &str) -> PathBuf {
        if package.is_empty() {
            self.root.clone()
        } else {
            self.root.join(package)
        }
    }

    /// The package that owns `file`: the nearest directory at or above the
    /// file's own that has a BUILD file, stopping at the workspace root.
    pub fn owning_package(&self, file: &Path) -> Option<(PathBuf, String)> {
        let mut dir = file.parent()?;
        loop {
            if !dir.starts_with(&self.root) {
                return None;
            }
            if build::find_build_file(dir).is_some() {
                return Some((dir.to_path_buf(), self.relative(dir)?));
            }
            if dir == self.root {
                return None;
            }
            dir = dir.parent()?;
        }
    }

    /// Name used for rules synthesized in `package`: its last path segment,
    /// or the workspace directory name for the root package.
    pub fn package_basename(&self, package: &str) -> String {
        match package.rsplit('/').next() {
            Some(last) if !last.is_empty() => last.to_string(),
            _ => self
                .root
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("root")
                .to_string(),
        }
    }
}

/// Absolute, symlink-free form of an existing path.
pub fn canonical(path: &Path) -> Result<PathBuf, Error> {
    path.canonicalize().map_err(|e| Error::io("resolve", path, e))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn ws() -> (tempfile::TempDir, Workspace) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::write(root.join("WORKSPACE"), "").unwrap();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        (tmp, Workspace::at(root))
    }

    #[test]
    fn find_walks_up_to_marker() {
        let (_tmp, ws) = ws();
        let found = Workspace::find(&ws.root().join("a/b/c")).unwrap();
        assert_eq!(found.root(), ws.root());
    }

    #[test]
    fn module_bazel_is_a_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::write(root.join("MODULE.bazel"), "").unwrap();
        fs::create_dir_all(root.join("x")).unwrap();
        assert_eq!(Workspace::find(&root.join("x")).unwrap().root(), root);
    }

    #[test]
    fn package_names_use_forward_slashes() {
        let (_tmp, ws) = ws();
        assert_eq!(ws.package_of(&ws.root().join("a/b")).unwrap(), "a/b");
        assert_eq!(ws.package_of(ws.root()).unwrap(), "");
        assert!(matches!(
            ws.package_of(Path::new("/elsewhere")),
            Err(Error::OutsideWorkspace(_))
        ));
    }

    #[test]
    fn owning_package_is_nearest_build_ancestor() {
        let (_tmp, ws) = ws();
        fs::write(ws.root().join("a/BUILD"), "").unwrap();
        let (dir, pkg) = ws.owning_package(&ws.root().join("a/b/c/x.ts")).unwrap();
        assert_eq!(dir, ws.root().join("a"));
        assert_eq!(pkg, "a");
        assert!(ws.owning_package(&ws.root().join("z.ts")).is_none());
    }

    #[test]
    fn basename_of_root_package_is_directory_name() {
        let (_tmp, ws) = ws();
        assert_eq!(ws.package_basename("a/b"), "b");
        let dir_name = ws.root().file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(ws.package_basename(""), dir_name);
    }
}
