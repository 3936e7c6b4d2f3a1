use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use rayon::prelude::*;

use crate::error::Error;
use crate::lang::is_typescript_source;
use crate::lang::typescript::is_skipped_dir;
use crate::source::{self, SourceFile};
use crate::workspace::{self, Workspace};

/// A directory to update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDir {
    /// Canonical directory.
    pub dir: PathBuf,
    /// The path as the user wrote it (or as the walk reached it).
    pub display: String,
    pub package: String,
}

/// `--files` mode: keep TypeScript sources and return their directories,
/// in first-seen order.
pub fn filter_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for path in paths.iter().filter(|p| is_typescript_source(p)) {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Every directory under `root` (itself included), skipping output links,
/// dot-directories and `node_modules`. Symlinked directories are not
/// followed. Respects .gitignore.
pub fn walk_dirs(root: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .follow_links(false)
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_some_and(|t| t.is_dir())
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(is_skipped_dir)
        })
        .build();

    walker
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_dir()))
        .map(ignore::DirEntry::into_path)
        .collect()
}

/// Deepest directories first; equal lengths in lexicographic order.
pub fn order_deepest_first(dirs: &mut [PathBuf]) {
    dirs.sort_by(|a, b| {
        let (a, b) = (a.to_string_lossy(), b.to_string_lossy());
        (Reverse(a.len()), a).cmp(&(Reverse(b.len()), b))
    });
}

/// Turn command-line paths into the packages to update, in update order.
pub fn expand(workspace: &Workspace, paths: &[PathBuf], recursive: bool) -> Result<Vec<PackageDir>, Error> {
    let mut dirs: Vec<PathBuf> = if recursive {
        paths.iter().flat_map(|p| walk_dirs(p)).collect()
    } else {
        paths.to_vec()
    };
    if recursive {
        order_deepest_first(&mut dirs);
    }

    let mut packages: Vec<PackageDir> = Vec::with_capacity(dirs.len());
    for path in dirs {
        let dir = workspace::canonical(&path)?;
        if packages.iter().any(|p| p.dir == dir) {
            continue;
        }
        let package = workspace.package_of(&dir)?;
        let display = path.to_string_lossy().trim_end_matches('/').to_string();
        packages.push(PackageDir {
            dir,
            display: if display.is_empty() { "/".to_string() } else { display },
            package,
        });
    }
    Ok(packages)
}

/// Scan the sources of every package. Files are parsed in parallel; the
/// result keeps the order of `packages`.
pub fn read_packages(
    lang: &crate::lang::typescript::TypeScriptSupport,
    packages: &[PackageDir],
) -> Result<Vec<Vec<SourceFile>>, Error> {
    packages
        .par_iter()
        .map(|pkg| {
            source::package_sources(&pkg.dir)?
                .par_iter()
                .map(|name| source::read_source(lang, &pkg.dir, name))
                .collect::<Result<Vec<_>, Error>>()
        })
        .collect()
}
